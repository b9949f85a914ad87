use crate::engine::{Engine, Signal, State};
use crate::sync::Arc;
use crate::{BatchError, BufferError, CancelToken, Config, MetricsSnapshot, ProdCons, ProducerId};
use std::time::{Duration, Instant};
use tracing::debug;

/// Bounded, closable FIFO buffer of plain slots.
///
/// Producers block while it is full, consumers while it is empty and still
/// open. Once every expected producer has called
/// [`producer_finished`](ProdCons::producer_finished) the buffer closes and
/// drained consumers receive the end-of-stream sentinel instead of blocking.
///
/// Handles are cheap to clone and share one buffer.
///
/// # Example
///
/// ```
/// use prodcons_rs::{Buffer, CancelToken, ProdCons};
/// use std::thread;
///
/// let buffer = Buffer::<u32>::with_capacity(2).unwrap();
/// buffer.configure_expected_producers(1);
/// let cancel = CancelToken::new();
///
/// let producer = buffer.register_producer(&cancel).unwrap();
/// let handle = thread::spawn(move || {
///     for i in 1..=3 {
///         producer.put(i).unwrap();
///     }
///     // dropping the guard reports the producer finished
/// });
///
/// let mut got = Vec::new();
/// while let Some(item) = buffer.get(&cancel).unwrap() {
///     got.push(item);
/// }
/// handle.join().unwrap();
/// assert_eq!(got, vec![1, 2, 3]);
/// ```
pub struct Buffer<T> {
    engine: Arc<Engine<T>>,
}

impl<T> Buffer<T> {
    /// Creates a buffer with the given configuration.
    pub fn new(config: Config) -> Result<Self, BufferError> {
        Ok(Self {
            engine: Arc::new(Engine::new(config)?),
        })
    }

    /// Creates a buffer of `capacity` slots with metrics off.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        Self::new(Config::new(capacity, false))
    }

    pub fn config(&self) -> Config {
        self.engine.config()
    }
}

impl<T: Send + 'static> Buffer<T> {
    /// Inserts `item` at the tail, blocking while the buffer is full.
    ///
    /// Wakes one waiting consumer. Fails with `Closed` if the buffer closed
    /// before space was found, and with `Cancelled` if `cancel` fired first;
    /// in both cases nothing was inserted.
    pub fn put(&self, item: T, cancel: &CancelToken) -> Result<(), BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let state = self.engine.lock();
        let mut state = Engine::wait_while(
            &self.engine,
            state,
            Signal::NotFull,
            cancel,
            None,
            State::saturated,
        )?;
        if state.closed {
            return Err(BufferError::Closed);
        }

        state.admit(item, 1);
        self.engine.notify_one(Signal::NotEmpty);
        Ok(())
    }

    /// Removes the head item, blocking while the buffer is empty and open.
    ///
    /// Returns `Ok(None)` once the buffer is closed and drained.
    pub fn get(&self, cancel: &CancelToken) -> Result<Option<T>, BufferError> {
        self.get_until(cancel, None)
    }

    /// Like [`get`](Self::get) but returns `Err(Timeout)` if nothing arrived
    /// within `timeout` while the buffer stayed open.
    pub fn get_timeout(
        &self,
        cancel: &CancelToken,
        timeout: Duration,
    ) -> Result<Option<T>, BufferError> {
        self.get_until(cancel, Instant::now().checked_add(timeout))
    }

    fn get_until(
        &self,
        cancel: &CancelToken,
        deadline: Option<Instant>,
    ) -> Result<Option<T>, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let state = self.engine.lock();
        let mut state = Engine::wait_while(
            &self.engine,
            state,
            Signal::NotEmpty,
            cancel,
            deadline,
            State::starved,
        )?;

        // Not starved: either an item is ready, or closed and empty.
        let item = state.take();
        if item.is_some() {
            self.engine.notify_one(Signal::NotFull);
        }
        Ok(item)
    }

    /// Takes up to `k` items in FIFO order.
    ///
    /// While the buffer is open the call keeps waiting until `k` items are
    /// collected; once it is closed it returns whatever was collected. An
    /// empty batch is the end-of-stream sentinel.
    ///
    /// If `cancel` fires after some items were already taken, the call fails
    /// with a [`BatchError`] whose cause is `Cancelled` and whose `items`
    /// hold what was taken, so nothing is lost and a short batch is never
    /// mistaken for a closed buffer.
    pub fn get_batch(&self, k: usize, cancel: &CancelToken) -> Result<Vec<T>, BatchError<T>> {
        if k == 0 {
            return Err(BatchError::new(BufferError::InvalidBatchSize));
        }
        if cancel.is_cancelled() {
            return Err(BatchError::new(BufferError::Cancelled));
        }

        let mut batch = Vec::with_capacity(k.min(self.engine.config().capacity));
        let mut state = self.engine.lock();

        loop {
            state = match Engine::wait_while(
                &self.engine,
                state,
                Signal::NotEmpty,
                cancel,
                None,
                State::starved,
            ) {
                Ok(state) => state,
                Err(cause) => {
                    debug!(taken = batch.len(), %cause, "batch aborted");
                    return Err(BatchError {
                        items: batch,
                        cause,
                    });
                }
            };

            // Closed and drained: nothing more will ever arrive.
            if state.store.is_empty() {
                break;
            }

            let want = (k - batch.len()).min(state.store.len());
            batch.extend(std::iter::from_fn(|| state.take()).take(want));
            if want == 1 {
                self.engine.notify_one(Signal::NotFull);
            } else {
                self.engine.notify_all(Signal::NotFull);
            }

            if batch.len() == k || state.closed {
                break;
            }
        }

        if !batch.is_empty() {
            state.metrics.add_batch();
        }
        Ok(batch)
    }
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<T: Send + 'static> ProdCons<T> for Buffer<T> {
    fn configure_expected_producers(&self, n: usize) {
        self.engine.configure_expected_producers(n);
    }

    fn put(&self, item: T, cancel: &CancelToken) -> Result<(), BufferError> {
        Buffer::put(self, item, cancel)
    }

    fn get(&self, cancel: &CancelToken) -> Result<Option<T>, BufferError> {
        Buffer::get(self, cancel)
    }

    fn producer_finished(&self) {
        self.engine.producer_finished();
    }

    fn register(&self) -> Result<ProducerId, BufferError> {
        self.engine.register_producer()
    }

    fn is_closed(&self) -> bool {
        self.engine.is_closed()
    }

    fn len(&self) -> usize {
        self.engine.len()
    }

    fn capacity(&self) -> usize {
        self.engine.config().capacity
    }

    fn total_admitted(&self) -> u64 {
        self.engine.total_admitted()
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.engine.metrics()
    }

    fn next_message_id(&self) -> u64 {
        self.engine.next_message_id()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_put_get_fifo() {
        let buffer = Buffer::<u64>::with_capacity(4).unwrap();
        let cancel = CancelToken::new();

        for i in 0..4 {
            buffer.put(i, &cancel).unwrap();
        }
        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.total_admitted(), 4);

        for i in 0..4 {
            assert_eq!(buffer.get(&cancel).unwrap(), Some(i));
        }
        assert!(buffer.is_empty());
        assert_eq!(buffer.total_admitted(), 4);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            Buffer::<u8>::with_capacity(0),
            Err(BufferError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_get_on_closed_empty_returns_sentinel() {
        let buffer = Buffer::<u8>::with_capacity(1).unwrap();
        buffer.configure_expected_producers(0);
        assert_eq!(buffer.get(&CancelToken::new()), Ok(None));
    }

    #[test]
    fn test_put_after_close_is_rejected() {
        let buffer = Buffer::<u8>::with_capacity(1).unwrap();
        buffer.configure_expected_producers(0);
        assert_eq!(buffer.put(1, &CancelToken::new()), Err(BufferError::Closed));
        assert_eq!(buffer.total_admitted(), 0);
    }

    #[test]
    fn test_closed_buffer_still_drains() {
        let buffer = Buffer::<u8>::with_capacity(2).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);
        buffer.put(1, &cancel).unwrap();
        buffer.put(2, &cancel).unwrap();
        buffer.producer_finished();

        assert!(buffer.is_closed());
        assert_eq!(buffer.get(&cancel), Ok(Some(1)));
        assert_eq!(buffer.get(&cancel), Ok(Some(2)));
        assert_eq!(buffer.get(&cancel), Ok(None));
    }

    #[test]
    fn test_batch_rejects_zero() {
        let buffer = Buffer::<u8>::with_capacity(1).unwrap();
        let err = buffer.get_batch(0, &CancelToken::new()).unwrap_err();
        assert_eq!(err.cause, BufferError::InvalidBatchSize);
        assert!(err.items.is_empty());
    }

    #[test]
    fn test_batch_returns_exactly_k_while_open() {
        let buffer = Buffer::<u32>::with_capacity(4).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);
        for i in 0..4 {
            buffer.put(i, &cancel).unwrap();
        }

        assert_eq!(buffer.get_batch(2, &cancel).unwrap(), vec![0, 1]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_batch_returns_partial_once_closed() {
        let buffer = Buffer::<u32>::with_capacity(4).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);
        buffer.put(7, &cancel).unwrap();
        buffer.producer_finished();

        assert_eq!(buffer.get_batch(3, &cancel).unwrap(), vec![7]);
        assert!(buffer.get_batch(3, &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_batch_waits_to_fill_while_open() {
        let buffer = Buffer::<u32>::with_capacity(2).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);

        let producer = {
            let buffer = buffer.clone();
            let cancel = cancel.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    buffer.put(i, &cancel).unwrap();
                }
                buffer.producer_finished();
            })
        };

        // k larger than capacity: the batch fills across several refills.
        let batch = buffer.get_batch(5, &cancel).unwrap();
        producer.join().unwrap();
        assert_eq!(batch, vec![0, 1, 2, 3, 4]);
        assert!(buffer.get_batch(5, &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_batch_cancelled_midway_reports_cancel_with_items() {
        let buffer = Buffer::<u32>::new(Config::new(4, true)).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);
        buffer.put(7, &cancel).unwrap();

        let consumer = {
            let buffer = buffer.clone();
            let cancel = cancel.clone();
            thread::spawn(move || buffer.get_batch(3, &cancel))
        };
        // The batch took 7 and is now waiting for two more.
        while buffer.metrics().consumer_waits == 0 {
            thread::yield_now();
        }
        cancel.cancel();

        let err = consumer.join().unwrap().unwrap_err();
        assert_eq!(err.cause, BufferError::Cancelled);
        assert_eq!(err.items, vec![7]);
        assert!(!buffer.is_closed());
        assert!(buffer.is_empty());
        assert_eq!(buffer.metrics().batches_taken, 0);
    }

    #[test]
    fn test_get_timeout() {
        let buffer = Buffer::<u8>::with_capacity(1).unwrap();
        let cancel = CancelToken::new();
        assert_eq!(
            buffer.get_timeout(&cancel, Duration::from_millis(10)),
            Err(BufferError::Timeout)
        );
        buffer.put(3, &cancel).unwrap();
        assert_eq!(
            buffer.get_timeout(&cancel, Duration::from_millis(10)),
            Ok(Some(3))
        );
    }

    #[test]
    fn test_cancel_blocked_producer_leaves_state_intact() {
        let buffer = Buffer::<u8>::new(Config::new(1, true)).unwrap();
        let cancel = CancelToken::new();
        buffer.put(1, &cancel).unwrap();

        let blocked = {
            let buffer = buffer.clone();
            let cancel = cancel.clone();
            thread::spawn(move || buffer.put(2, &cancel))
        };
        while buffer.metrics().producer_waits == 0 {
            thread::yield_now();
        }
        cancel.cancel();

        assert_eq!(blocked.join().unwrap(), Err(BufferError::Cancelled));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.total_admitted(), 1);
        assert_eq!(buffer.metrics().cancellations, 1);
        assert_eq!(buffer.get(&CancelToken::new()), Ok(Some(1)));
    }

    #[test]
    fn test_metrics_counts() {
        let buffer = Buffer::<u8>::new(Config::new(4, true)).unwrap();
        let cancel = CancelToken::new();
        buffer.configure_expected_producers(1);
        for i in 0..3 {
            buffer.put(i, &cancel).unwrap();
        }
        buffer.producer_finished();
        assert_eq!(buffer.get_batch(2, &cancel).unwrap().len(), 2);
        assert_eq!(buffer.get(&cancel), Ok(Some(2)));

        let m = buffer.metrics();
        assert_eq!(m.items_put, 3);
        assert_eq!(m.items_taken, 3);
        assert_eq!(m.batches_taken, 1);
    }
}
