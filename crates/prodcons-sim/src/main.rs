//! prodcons-sim - run a producer/consumer simulation and print its report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use prodcons_sim::{Mode, SimOptions};
use tracing_subscriber::EnvFilter;

/// Producer/consumer simulation over a bounded, closable buffer.
#[derive(Parser, Debug)]
#[command(name = "prodcons-sim")]
#[command(about = "Run a producer/consumer simulation and check conservation")]
struct Cli {
    /// JSON options file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Buffer mode to exercise
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Number of producers
    #[arg(long)]
    producers: Option<usize>,

    /// Number of consumers (executor mode: maximum workers)
    #[arg(long)]
    consumers: Option<usize>,

    /// Buffer capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Pause after each put, in milliseconds
    #[arg(long)]
    prod_time_ms: Option<u64>,

    /// Pause after each get, in milliseconds
    #[arg(long)]
    cons_time_ms: Option<u64>,

    /// Smallest per-producer quota
    #[arg(long)]
    min_prod: Option<usize>,

    /// Largest per-producer quota
    #[arg(long)]
    max_prod: Option<usize>,

    /// Batch size for batch mode
    #[arg(long)]
    batch: Option<usize>,

    /// Copies per message for fan-out mode
    #[arg(long)]
    copies: Option<usize>,

    /// Seed for quotas and start order
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Result<SimOptions> {
        let mut opts = match &self.config {
            Some(path) => SimOptions::from_json_file(path)
                .with_context(|| format!("loading options from {}", path.display()))?,
            None => SimOptions::default(),
        };

        if let Some(mode) = self.mode {
            opts.mode = mode;
        }
        let overrides = [
            (self.producers, &mut opts.n_prod),
            (self.consumers, &mut opts.n_cons),
            (self.capacity, &mut opts.buf_sz),
            (self.min_prod, &mut opts.min_prod),
            (self.max_prod, &mut opts.max_prod),
            (self.batch, &mut opts.k),
            (self.copies, &mut opts.n_copies),
        ];
        for (flag, field) in overrides {
            if let Some(value) = flag {
                *field = value;
            }
        }
        if let Some(ms) = self.prod_time_ms {
            opts.prod_time_ms = ms;
        }
        if let Some(ms) = self.cons_time_ms {
            opts.cons_time_ms = ms;
        }
        if self.seed.is_some() {
            opts.seed = self.seed;
        }
        Ok(opts)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging: RUST_LOG wins, --verbose raises the default to debug.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();

    let opts = cli.options()?;
    let report = prodcons_sim::run(&opts).context("simulation failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
