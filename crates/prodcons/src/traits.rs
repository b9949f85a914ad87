use crate::{BufferError, CancelToken, MetricsSnapshot, ProducerGuard, ProducerId};

/// Capability shared by every buffer mode.
///
/// Plain and fan-out buffers differ only in slot representation; drivers
/// written against this trait run unchanged on either. Mode-specific calls
/// (`get_batch`, `put_copies`) stay inherent on the concrete types.
pub trait ProdCons<T> {
    /// Sets how many producers will call [`producer_finished`](Self::producer_finished).
    ///
    /// Zero closes the buffer immediately. Ignored once the buffer is closed.
    fn configure_expected_producers(&self, n: usize);

    /// Inserts one item, blocking while the buffer is full.
    ///
    /// In fan-out mode this is a group of one copy, so the call also waits
    /// for that copy to be claimed.
    fn put(&self, item: T, cancel: &CancelToken) -> Result<(), BufferError>;

    /// Takes the oldest item, blocking while the buffer is empty and open.
    ///
    /// `Ok(None)` is the end-of-stream sentinel: closed and drained.
    fn get(&self, cancel: &CancelToken) -> Result<Option<T>, BufferError>;

    /// Records that one producer is done. The last one closes the buffer.
    fn producer_finished(&self);

    /// Claims one of the configured producer slots.
    fn register(&self) -> Result<ProducerId, BufferError>;

    fn is_closed(&self) -> bool;

    /// Occupied slots (plain) or groups (fan-out).
    #[doc(alias = "size")]
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    /// Items or copies admitted since construction. Never decreases.
    fn total_admitted(&self) -> u64;

    fn metrics(&self) -> MetricsSnapshot;

    /// Next identifier from this buffer's message counter.
    fn next_message_id(&self) -> u64;

    /// Registers a producer whose guard calls `producer_finished` on drop.
    fn register_producer(&self, cancel: &CancelToken) -> Result<ProducerGuard<T, Self>, BufferError>
    where
        Self: Clone + Sized,
    {
        let id = self.register()?;
        Ok(ProducerGuard::new(self.clone(), id, cancel.clone()))
    }
}
