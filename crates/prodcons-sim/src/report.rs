//! End-of-run statistics and verdict.

use std::fmt;

use serde::Serialize;

use crate::config::Mode;

/// Outcome of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub mode: Mode,
    pub producers: usize,
    pub consumers: usize,
    pub capacity: usize,
    /// Messages drawn for each producer, in producer order.
    pub quotas: Vec<usize>,
    /// Items (or copies, in fan-out mode) the quotas call for.
    pub expected: u64,
    /// Items the buffer reports as admitted.
    pub admitted: u64,
    /// Items handed to consumers.
    pub consumed: u64,
    /// Occupancy once every thread was joined.
    pub final_size: usize,
    pub closed: bool,
    pub elapsed_ms: u64,
}

impl Report {
    /// Everything produced was admitted and consumed, and the buffer ended
    /// closed and empty.
    pub fn passed(&self) -> bool {
        self.admitted == self.expected
            && self.consumed == self.expected
            && self.final_size == 0
            && self.closed
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==================================================")?;
        writeln!(f, "[{}] prodcons simulation report", self.mode)?;
        writeln!(
            f,
            "  producers = {}  consumers = {}  capacity = {}",
            self.producers, self.consumers, self.capacity
        )?;
        for (i, quota) in self.quotas.iter().enumerate() {
            writeln!(f, "  P-{} quota: {quota}", i + 1)?;
        }
        writeln!(f, "  expected   = {}", self.expected)?;
        writeln!(f, "  admitted   = {}", self.admitted)?;
        writeln!(f, "  consumed   = {}", self.consumed)?;
        writeln!(f, "  final size = {}", self.final_size)?;
        writeln!(f, "  closed     = {}", self.closed)?;
        writeln!(f, "  elapsed    = {} ms", self.elapsed_ms)?;
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        writeln!(f, "  verdict    = {verdict}")?;
        write!(f, "==================================================")
    }
}
