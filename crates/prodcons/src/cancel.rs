//! External cancellation for blocking buffer calls.
//!
//! A blocked `put`/`get` registers a waker for its buffer with the token
//! before it first sleeps. [`CancelToken::cancel`] sets the flag and then runs
//! every registered waker, which takes that buffer's lock and broadcasts its
//! condition variables; the waiter re-checks the flag in its predicate loop.
//!
//! Lock order: a waiter may touch the waker registry while holding a buffer
//! lock, but `cancel` never holds the registry lock while running wakers.

use crate::sync::{self, Arc, AtomicBool, Mutex, Ordering};
use std::fmt;
use tracing::debug;

/// Callback that wakes every waiter of one buffer.
pub(crate) type Waker = std::sync::Arc<dyn Fn() + Send + Sync>;

/// Cloneable cancellation signal for blocking calls.
///
/// All clones share one flag. Once cancelled, a token stays cancelled; every
/// blocking call made with it returns [`BufferError::Cancelled`](crate::BufferError::Cancelled).
///
/// # Example
///
/// ```
/// use prodcons_rs::{Buffer, BufferError, CancelToken};
/// use std::thread;
///
/// let buffer = Buffer::<u32>::with_capacity(1).unwrap();
/// let cancel = CancelToken::new();
///
/// let consumer = {
///     let buffer = buffer.clone();
///     let cancel = cancel.clone();
///     thread::spawn(move || buffer.get(&cancel))
/// };
///
/// cancel.cancel();
/// assert_eq!(consumer.join().unwrap(), Err(BufferError::Cancelled));
/// ```
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    wakers: Mutex<Wakers>,
}

struct Wakers {
    next_id: u64,
    entries: Vec<(u64, Waker)>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                wakers: Mutex::new(Wakers {
                    next_id: 0,
                    entries: Vec::new(),
                }),
            }),
        }
    }

    /// Cancels every current and future blocking call made with this token.
    ///
    /// Idempotent: only the first call wakes anyone.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let wakers: Vec<Waker> = sync::lock(&self.inner.wakers)
            .entries
            .iter()
            .map(|(_, waker)| std::sync::Arc::clone(waker))
            .collect();

        debug!(waiters = wakers.len(), "cancel token fired");
        for waker in wakers {
            waker();
        }
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Registers `waker` until the returned registration is dropped.
    pub(crate) fn register(&self, waker: Waker) -> WakerRegistration<'_> {
        let mut wakers = sync::lock(&self.inner.wakers);
        let id = wakers.next_id;
        wakers.next_id += 1;
        wakers.entries.push((id, waker));
        WakerRegistration { token: self, id }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Removes its waker from the token when dropped.
pub(crate) struct WakerRegistration<'a> {
    token: &'a CancelToken,
    id: u64,
}

impl Drop for WakerRegistration<'_> {
    fn drop(&mut self) {
        let mut wakers = sync::lock(&self.token.inner.wakers);
        wakers.entries.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn test_registered_waker_runs_once() {
        let token = CancelToken::new();
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&calls);
        let _registration = token.register(std::sync::Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        token.cancel();
        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_registration_is_not_woken() {
        let token = CancelToken::new();
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&calls);
        drop(token.register(std::sync::Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        token.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(sync::lock(&token.inner.wakers).entries.is_empty());
    }
}
