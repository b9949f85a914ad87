//! Fan-out barrier mode.
//!
//! A slot holds a *group*: one item that must be claimed by exactly
//! `required` consumers. The depositing producer and every claimant block
//! until the last copy is claimed; the last claimant removes the group and
//! releases all of them with one broadcast.
//!
//! Capacity is measured in groups, not copies.

use crate::engine::{Engine, Signal, State};
use crate::invariants::{debug_assert_group_fifo, debug_assert_monotonic, debug_assert_taken_bounded};
use crate::sync::Arc;
use crate::{BufferError, CancelToken, Config, MetricsSnapshot, ProdCons, ProducerId};
use tracing::trace;

/// One logical item awaiting `required` claims.
struct Group<T> {
    /// Insertion order; groups complete in this order.
    seq: u64,
    item: T,
    required: usize,
    /// Only increases; the group leaves the store when it reaches `required`.
    taken: usize,
}

/// Bounded, closable buffer whose items are consumed `n` times each.
///
/// # Example
///
/// ```
/// use prodcons_rs::{CancelToken, FanoutBuffer, ProdCons};
/// use std::thread;
///
/// let buffer = FanoutBuffer::<&str>::with_capacity(1).unwrap();
/// let cancel = CancelToken::new();
///
/// let consumers: Vec<_> = (0..3)
///     .map(|_| {
///         let buffer = buffer.clone();
///         let cancel = cancel.clone();
///         thread::spawn(move || buffer.get(&cancel))
///     })
///     .collect();
///
/// // Returns only once all three copies were claimed.
/// buffer.put_copies("hello", 3, &cancel).unwrap();
/// assert_eq!(buffer.len(), 0);
///
/// for consumer in consumers {
///     assert_eq!(consumer.join().unwrap(), Ok(Some("hello")));
/// }
/// ```
pub struct FanoutBuffer<T> {
    engine: Arc<Engine<Group<T>>>,
}

impl<T> FanoutBuffer<T> {
    /// Creates a buffer holding at most `config.capacity` groups.
    pub fn new(config: Config) -> Result<Self, BufferError> {
        Ok(Self {
            engine: Arc::new(Engine::new(config)?),
        })
    }

    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        Self::new(Config::new(capacity, false))
    }

    pub fn config(&self) -> Config {
        self.engine.config()
    }
}

impl<T: Clone + Send + 'static> FanoutBuffer<T> {
    /// Deposits `item` as a group of `required` copies.
    ///
    /// Blocks while the buffer is full, then blocks again until every copy
    /// has been claimed. If `cancel` fires after insertion the group stays
    /// in place for its consumers and only this call returns `Cancelled`.
    pub fn put_copies(
        &self,
        item: T,
        required: usize,
        cancel: &CancelToken,
    ) -> Result<(), BufferError> {
        if required == 0 {
            return Err(BufferError::InvalidCopies);
        }
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

        let seq = state.groups_inserted;
        state.groups_inserted += 1;
        state.admit(
            Group {
                seq,
                item,
                required,
                taken: 0,
            },
            required as u64,
        );
        trace!(seq, required, "group inserted");
        // One group can satisfy many waiting claimants.
        self.engine.notify_all(Signal::NotEmpty);

        Engine::wait_while(
            &self.engine,
            state,
            Signal::GroupDone,
            cancel,
            None,
            |s| s.groups_completed <= seq,
        )?;
        Ok(())
    }

    /// Claims one copy of the head group.
    ///
    /// Blocks while no group is present and the buffer is open, then blocks
    /// until the group's last copy is claimed. Returns `Ok(None)` once closed
    /// and drained. A claim is never undone: if `cancel` fires while waiting
    /// for the other claimants, the copy still counts as taken.
    pub fn get(&self, cancel: &CancelToken) -> Result<Option<T>, BufferError> {
        if cancel.is_cancelled() {
            return Err(BufferError::Cancelled);
        }

        let state = self.engine.lock();
        let mut state = Engine::wait_while(
            &self.engine,
            state,
            Signal::NotEmpty,
            cancel,
            None,
            State::starved,
        )?;

        let (seq, last, item) = match state.store.front_mut() {
            Some(group) => {
                group.taken += 1;
                debug_assert_taken_bounded!(group.taken, group.required);
                let last = group.taken == group.required;
                // The last claimant takes the stored value itself below.
                let item = if last { None } else { Some(group.item.clone()) };
                (group.seq, last, item)
            }
            // Closed and drained.
            None => return Ok(None),
        };
        state.metrics.add_items_taken(1);

        if last {
            let group = state.store.pop_front();
            debug_assert_group_fifo!(seq, state.groups_completed);
            let old_completed = state.groups_completed;
            state.groups_completed += 1;
            debug_assert_monotonic!("groups_completed", old_completed, state.groups_completed);
            state.metrics.add_group_completed();
            trace!(seq, "group completed");

            // Release the producer and every claimant of this group, then one
            // producer waiting for a free group position.
            self.engine.notify_all(Signal::GroupDone);
            self.engine.notify_one(Signal::NotFull);
            return Ok(group.map(|g| g.item));
        }

        Engine::wait_while(
            &self.engine,
            state,
            Signal::GroupDone,
            cancel,
            None,
            |s| s.groups_completed <= seq,
        )?;
        Ok(item)
    }
}

impl<T> Clone for FanoutBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<T: Clone + Send + 'static> ProdCons<T> for FanoutBuffer<T> {
    fn configure_expected_producers(&self, n: usize) {
        self.engine.configure_expected_producers(n);
    }

    /// A group of one copy.
    fn put(&self, item: T, cancel: &CancelToken) -> Result<(), BufferError> {
        self.put_copies(item, 1, cancel)
    }

    fn get(&self, cancel: &CancelToken) -> Result<Option<T>, BufferError> {
        FanoutBuffer::get(self, cancel)
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
