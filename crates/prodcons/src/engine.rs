use crate::cancel::{CancelToken, WakerRegistration};
use crate::invariants::{debug_assert_bounded_count, debug_assert_monotonic, debug_assert_open};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::Store;
use crate::sync::{self, Arc, AtomicU64, Condvar, Mutex, MutexGuard, Ordering};
use crate::{BufferError, Config, ProducerId};
use std::time::Instant;
use tracing::{debug, trace};

// =============================================================================
// LOCKING & WAKEUP PROTOCOL
// =============================================================================
//
// One mutex guards everything in `State`: the circular store, counts, the
// closing state and the fan-out group counters. Three condition variables
// hang off it:
//
// - `not_full`:   producers waiting for a free slot/group position.
//                 Plain `get` frees one slot -> notify_one.
//                 Batch `get` frees several -> notify_all.
// - `not_empty`:  consumers waiting for an item.
//                 Plain `put` adds one item -> notify_one.
//                 Group insertion may satisfy many claimants -> notify_all.
//                 Closing must release every consumer -> notify_all.
// - `group_done`: fan-out producers and claimants waiting for a group's last
//                 copy to be taken. Completion -> notify_all.
//
// Every wait is a predicate loop: a broadcast can release threads whose own
// predicate still does not hold (claimants of a later group, producers of a
// group that is not the head).
//
// Groups complete strictly in insertion order because only the head group is
// ever claimed. A party waiting on group `seq` therefore waits while
// `groups_completed <= seq`.
//
// =============================================================================

/// Which condition a blocked call is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Signal {
    NotFull,
    NotEmpty,
    GroupDone,
}

/// Everything behind the engine lock.
pub(crate) struct State<S> {
    pub(crate) store: Store<S>,
    /// Items (plain) or copies (fan-out) ever admitted. Never decreases.
    pub(crate) total_admitted: u64,
    expected_producers: usize,
    registered_producers: usize,
    producers_remaining: usize,
    /// false -> true exactly once, never back.
    pub(crate) closed: bool,
    /// Sequence number handed to the next fan-out group.
    pub(crate) groups_inserted: u64,
    pub(crate) groups_completed: u64,
    pub(crate) metrics: Metrics,
}

impl<S> State<S> {
    fn new(config: &Config) -> Self {
        Self {
            store: Store::with_capacity(config.capacity),
            total_admitted: 0,
            expected_producers: 0,
            registered_producers: 0,
            producers_remaining: 0,
            closed: false,
            groups_inserted: 0,
            groups_completed: 0,
            metrics: Metrics::new(config.enable_metrics),
        }
    }

    /// Inserts `slot` at the tail and counts `copies` admissions.
    pub(crate) fn admit(&mut self, slot: S, copies: u64) {
        debug_assert_open!(self.closed);
        let old_total = self.total_admitted;
        self.store.push_back(slot);
        self.total_admitted += copies;
        debug_assert_bounded_count!(self.store.len(), self.store.capacity());
        debug_assert_monotonic!("total_admitted", old_total, self.total_admitted);
        self.metrics.add_items_put(copies);
    }

    /// Removes the head slot.
    pub(crate) fn take(&mut self) -> Option<S> {
        let slot = self.store.pop_front();
        if slot.is_some() {
            self.metrics.add_items_taken(1);
        }
        slot
    }

    /// True when a consumer has nothing to take yet but more may arrive.
    #[inline]
    pub(crate) fn starved(&self) -> bool {
        self.store.is_empty() && !self.closed
    }

    /// True when a producer has to wait for space.
    #[inline]
    pub(crate) fn saturated(&self) -> bool {
        self.store.is_full() && !self.closed
    }
}

/// Shared core behind [`Buffer`](crate::Buffer) and
/// [`FanoutBuffer`](crate::FanoutBuffer), generic over the slot type.
pub(crate) struct Engine<S> {
    state: Mutex<State<S>>,
    not_full: Condvar,
    not_empty: Condvar,
    group_done: Condvar,
    /// Message identifiers minted by producers of this buffer.
    next_message_id: AtomicU64,
    config: Config,
}

impl<S> Engine<S> {
    pub(crate) fn new(config: Config) -> Result<Self, BufferError> {
        config.validate()?;
        Ok(Self {
            state: Mutex::new(State::new(&config)),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            group_done: Condvar::new(),
            next_message_id: AtomicU64::new(1),
            config,
        })
    }

    #[inline]
    pub(crate) fn config(&self) -> Config {
        self.config
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, State<S>> {
        sync::lock(&self.state)
    }

    fn condvar(&self, signal: Signal) -> &Condvar {
        match signal {
            Signal::NotFull => &self.not_full,
            Signal::NotEmpty => &self.not_empty,
            Signal::GroupDone => &self.group_done,
        }
    }

    #[inline]
    pub(crate) fn notify_one(&self, signal: Signal) {
        self.condvar(signal).notify_one();
    }

    #[inline]
    pub(crate) fn notify_all(&self, signal: Signal) {
        self.condvar(signal).notify_all();
    }

    /// Wakes every waiter so each re-checks its predicate and cancel flag.
    fn wake_all(&self) {
        let _state = self.lock();
        self.not_full.notify_all();
        self.not_empty.notify_all();
        self.group_done.notify_all();
    }

    // ---------------------------------------------------------------------
    // CLOSING PROTOCOL
    // ---------------------------------------------------------------------

    pub(crate) fn configure_expected_producers(&self, n: usize) {
        let mut state = self.lock();
        if state.closed {
            debug!(n, "expected producers configured on a closed buffer; ignored");
            return;
        }
        state.expected_producers = n;
        state.producers_remaining = n;
        if n == 0 {
            self.close_locked(&mut state);
        }
    }

    pub(crate) fn register_producer(&self) -> Result<ProducerId, BufferError> {
        let mut state = self.lock();
        if state.closed {
            return Err(BufferError::Closed);
        }
        if state.registered_producers >= state.expected_producers {
            return Err(BufferError::TooManyProducers {
                max: state.expected_producers,
            });
        }
        state.registered_producers += 1;
        Ok(ProducerId::new(state.registered_producers as u64))
    }

    /// Extra calls past zero remaining are no-ops.
    pub(crate) fn producer_finished(&self) {
        let mut state = self.lock();
        if state.producers_remaining == 0 {
            return;
        }
        state.producers_remaining -= 1;
        trace!(remaining = state.producers_remaining, "producer finished");
        if state.producers_remaining == 0 {
            self.close_locked(&mut state);
        }
    }

    fn close_locked(&self, state: &mut State<S>) {
        if state.closed {
            return;
        }
        state.closed = true;
        debug!(
            pending = state.store.len(),
            total_admitted = state.total_admitted,
            "buffer closed"
        );
        // Every consumer must observe the transition; producers still waiting
        // for space are misusing the protocol and get `Closed`.
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    // ---------------------------------------------------------------------
    // SNAPSHOTS
    // ---------------------------------------------------------------------

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().store.len()
    }

    pub(crate) fn total_admitted(&self) -> u64 {
        self.lock().total_admitted
    }

    pub(crate) fn metrics(&self) -> MetricsSnapshot {
        self.lock().metrics.snapshot()
    }

    #[inline]
    pub(crate) fn next_message_id(&self) -> u64 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl<S: Send + 'static> Engine<S> {
    /// Blocks on `signal` while `blocked` holds, re-testing after every wake.
    ///
    /// Returns the reacquired guard once the predicate is false. On
    /// cancellation the pending wakeup is forwarded to another waiter, since
    /// this thread may have absorbed a single-target notify.
    pub(crate) fn wait_while<'a, F>(
        engine: &'a Arc<Self>,
        mut state: MutexGuard<'a, State<S>>,
        signal: Signal,
        cancel: &CancelToken,
        deadline: Option<Instant>,
        mut blocked: F,
    ) -> Result<MutexGuard<'a, State<S>>, BufferError>
    where
        F: FnMut(&State<S>) -> bool,
    {
        let mut registration: Option<WakerRegistration<'_>> = None;

        while blocked(&state) {
            if registration.is_none() {
                let target = Arc::clone(engine);
                registration = Some(cancel.register(std::sync::Arc::new(move || {
                    target.wake_all();
                })));
                state.metrics.add_wait(signal);
                trace!(?signal, "waiting");
            }

            // Checked after registering: a concurrent `cancel` either sees the
            // registration or its flag store is visible here.
            if cancel.is_cancelled() {
                state.metrics.add_cancellation();
                if signal != Signal::GroupDone {
                    engine.notify_one(signal);
                }
                debug!(?signal, "blocking call cancelled");
                return Err(BufferError::Cancelled);
            }

            state = match deadline {
                None => sync::wait(engine.condvar(signal), state),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(BufferError::Timeout);
                    }
                    sync::wait_timeout(engine.condvar(signal), state, deadline - now)
                }
            };
        }

        Ok(state)
    }
}
