//! prodcons-sim - Producer/consumer simulation driver.
//!
//! Draws a random quota per producer, starts producers and consumers in a
//! shuffled order against one of the `prodcons-rs` buffer modes, and checks
//! that everything produced was consumed exactly once (or exactly
//! `n_copies` times in fan-out mode).
//!
//! # Example
//!
//! ```
//! use prodcons_sim::{run, Mode, SimOptions};
//!
//! let opts = SimOptions {
//!     mode: Mode::Batch,
//!     prod_time_ms: 0,
//!     cons_time_ms: 0,
//!     seed: Some(42),
//!     ..SimOptions::default()
//! };
//! let report = run(&opts).unwrap();
//! assert!(report.passed());
//! ```

pub mod config;
pub mod driver;
pub mod report;

pub use config::{Mode, SimError, SimOptions};
pub use driver::{run, MONITOR_PERIOD};
pub use report::Report;
