//! Simulation options, loaded from a JSON options file and CLI overrides.

use std::fmt;
use std::path::{Path, PathBuf};

use prodcons_rs::{BufferError, ExecutorError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which buffer variant the run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One item per `get`.
    #[default]
    Plain,
    /// Consumers drain with `get_batch(k)`.
    Batch,
    /// Every message is a group of `n_copies` claimed by distinct consumers.
    Fanout,
    /// Producers submit tasks to an elastic executor of `n_cons` workers.
    Executor,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Plain => "plain",
            Mode::Batch => "batch",
            Mode::Fanout => "fanout",
            Mode::Executor => "executor",
        };
        f.write_str(name)
    }
}

/// Options file format. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    pub mode: Mode,
    /// Number of producers.
    pub n_prod: usize,
    /// Number of consumers (executor: maximum workers).
    pub n_cons: usize,
    /// Buffer capacity in slots or groups.
    pub buf_sz: usize,
    /// Pause after each put, in milliseconds.
    pub prod_time_ms: u64,
    /// Pause after each get, in milliseconds.
    pub cons_time_ms: u64,
    /// Smallest per-producer quota.
    pub min_prod: usize,
    /// Largest per-producer quota.
    pub max_prod: usize,
    /// Batch size for batch mode.
    pub k: usize,
    /// Copies per message for fan-out mode.
    pub n_copies: usize,
    /// Seed for quota and start-order randomness; drawn from entropy if unset.
    pub seed: Option<u64>,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Plain,
            n_prod: 3,
            n_cons: 2,
            buf_sz: 4,
            prod_time_ms: 10,
            cons_time_ms: 20,
            min_prod: 5,
            max_prod: 10,
            k: 3,
            n_copies: 2,
            seed: None,
        }
    }
}

/// Errors raised while loading options or running a simulation.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to read options file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid options JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid option {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A group needs as many distinct claimants as it has copies.
    #[error("n_copies ({copies}) exceeds n_cons ({consumers}); groups could never complete")]
    TooManyCopies { copies: usize, consumers: usize },

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("simulation thread panicked")]
    ThreadPanicked,
}

impl SimOptions {
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Rejects option sets that could not run to completion.
    pub fn validate(&self) -> Result<(), SimError> {
        let positive = [
            ("n_prod", self.n_prod),
            ("n_cons", self.n_cons),
            ("buf_sz", self.buf_sz),
            ("k", self.k),
            ("n_copies", self.n_copies),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(SimError::Invalid {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        if self.min_prod > self.max_prod {
            return Err(SimError::Invalid {
                field: "min_prod",
                reason: format!("{} is greater than max_prod {}", self.min_prod, self.max_prod),
            });
        }
        if self.mode == Mode::Fanout && self.n_copies > self.n_cons {
            return Err(SimError::TooManyCopies {
                copies: self.n_copies,
                consumers: self.n_cons,
            });
        }
        Ok(())
    }
}
