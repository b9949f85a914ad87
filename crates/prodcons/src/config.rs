use crate::BufferError;

/// Configuration for [`Buffer`](crate::Buffer) and [`FanoutBuffer`](crate::FanoutBuffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Number of slots (plain mode) or groups (fan-out mode). Must be > 0.
    pub capacity: usize,
    /// Enable metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(capacity: usize, enable_metrics: bool) -> Self {
        Self {
            capacity,
            enable_metrics,
        }
    }

    /// Returns a copy with metrics collection switched on.
    pub const fn with_metrics(mut self) -> Self {
        self.enable_metrics = true;
        self
    }

    /// Rejects configurations the engine cannot be built from.
    ///
    /// Nothing is clamped: a zero capacity is an error, not a capacity of one.
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.capacity == 0 {
            return Err(BufferError::InvalidCapacity);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 16,
            enable_metrics: false,
        }
    }
}

/// Single-slot handoff: every put waits for the previous item to be taken.
pub const RENDEZVOUS_CONFIG: Config = Config::new(1, false);

/// High throughput configuration (1K slots)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(1024, false);
