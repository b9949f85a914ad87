use crate::engine::Signal;

/// Point-in-time copy of a buffer's counters.
///
/// All fields stay zero unless the buffer was built with
/// [`Config::enable_metrics`](crate::Config::enable_metrics).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Items (plain mode) or copies (fan-out mode) admitted.
    pub items_put: u64,
    /// Items or copies handed to consumers.
    pub items_taken: u64,
    /// Non-empty batches returned by `get_batch`.
    pub batches_taken: u64,
    /// Fan-out groups fully drained and removed.
    pub groups_completed: u64,
    /// Calls that had to block for free space.
    pub producer_waits: u64,
    /// Calls that had to block for an item.
    pub consumer_waits: u64,
    /// Calls that had to block on a group's completion.
    pub barrier_waits: u64,
    /// Blocking calls aborted by cancellation.
    pub cancellations: u64,
}

/// Counters kept inside the buffer's critical section, so plain integers
/// suffice.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    enabled: bool,
    counters: MetricsSnapshot,
}

impl Metrics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            counters: MetricsSnapshot::default(),
        }
    }

    #[inline]
    pub(crate) fn add_items_put(&mut self, n: u64) {
        if self.enabled {
            self.counters.items_put += n;
        }
    }

    #[inline]
    pub(crate) fn add_items_taken(&mut self, n: u64) {
        if self.enabled {
            self.counters.items_taken += n;
        }
    }

    #[inline]
    pub(crate) fn add_batch(&mut self) {
        if self.enabled {
            self.counters.batches_taken += 1;
        }
    }

    #[inline]
    pub(crate) fn add_group_completed(&mut self) {
        if self.enabled {
            self.counters.groups_completed += 1;
        }
    }

    #[inline]
    pub(crate) fn add_wait(&mut self, signal: Signal) {
        if !self.enabled {
            return;
        }
        match signal {
            Signal::NotFull => self.counters.producer_waits += 1,
            Signal::NotEmpty => self.counters.consumer_waits += 1,
            Signal::GroupDone => self.counters.barrier_waits += 1,
        }
    }

    #[inline]
    pub(crate) fn add_cancellation(&mut self) {
        if self.enabled {
            self.counters.cancellations += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_metrics_stay_zero() {
        let mut m = Metrics::new(false);
        m.add_items_put(3);
        m.add_wait(Signal::NotFull);
        m.add_cancellation();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_waits_are_split_by_signal() {
        let mut m = Metrics::new(true);
        m.add_wait(Signal::NotFull);
        m.add_wait(Signal::NotEmpty);
        m.add_wait(Signal::NotEmpty);
        m.add_wait(Signal::GroupDone);
        let s = m.snapshot();
        assert_eq!(s.producer_waits, 1);
        assert_eq!(s.consumer_waits, 2);
        assert_eq!(s.barrier_waits, 1);
    }
}
