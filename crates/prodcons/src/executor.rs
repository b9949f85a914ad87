//! Elastic task executor on top of a plain [`Buffer`].
//!
//! Submitting a task spawns a worker only when no worker is idle and the pool
//! is below its limit. A worker that waits longer than the idle timeout for a
//! task retires. Shutting down closes the queue; workers drain what is left
//! and exit on the end-of-stream sentinel.

use crate::sync::{self, Arc, Mutex};
use crate::{Buffer, BufferError, CancelToken, Config, ProdCons};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Unit of work run by an executor worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Idle period after which a worker retires.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3);

/// Errors returned by [`TaskExecutor`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The worker limit must be greater than zero.
    #[error("max workers must be greater than 0")]
    InvalidWorkers,

    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Worker bookkeeping, guarded by the pool lock.
#[derive(Default)]
struct Pool {
    alive: usize,
    spawned: usize,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Joins workers that already retired so their handles do not pile up
    /// across spawn/retire cycles.
    fn reap_finished(&mut self) {
        let (finished, running): (Vec<_>, Vec<_>) = std::mem::take(&mut self.handles)
            .into_iter()
            .partition(JoinHandle::is_finished);
        self.handles = running;
        for handle in finished {
            if handle.join().is_err() {
                warn!("executor worker exited by panic");
            }
        }
    }
}

struct Shared {
    queue: Buffer<Task>,
    /// Workers currently blocked waiting for a task.
    idle: AtomicUsize,
    pool: Mutex<Pool>,
    max_workers: usize,
    idle_timeout: Duration,
    /// Never fired; executor waits are ended by closing or timing out.
    cancel: CancelToken,
}

/// Runs submitted closures on a pool of at most `max_workers` threads.
///
/// # Example
///
/// ```
/// use prodcons_rs::TaskExecutor;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// let executor = TaskExecutor::new(8, 2).unwrap();
/// let done = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let done = Arc::clone(&done);
///     executor.submit(move || {
///         done.fetch_add(1, Ordering::SeqCst);
///     }).unwrap();
/// }
/// executor.shutdown();
/// assert_eq!(done.load(Ordering::SeqCst), 10);
/// ```
pub struct TaskExecutor {
    shared: Arc<Shared>,
}

impl TaskExecutor {
    /// Creates an executor whose queue holds `capacity` pending tasks.
    pub fn new(capacity: usize, max_workers: usize) -> Result<Self, ExecutorError> {
        Self::with_idle_timeout(capacity, max_workers, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(
        capacity: usize,
        max_workers: usize,
        idle_timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        if max_workers == 0 {
            return Err(ExecutorError::InvalidWorkers);
        }
        let queue = Buffer::new(Config::new(capacity, false))?;
        // The executor itself is the only producer; closing it closes the queue.
        queue.configure_expected_producers(1);

        Ok(Self {
            shared: Arc::new(Shared {
                queue,
                idle: AtomicUsize::new(0),
                pool: Mutex::new(Pool::default()),
                max_workers,
                idle_timeout,
                cancel: CancelToken::new(),
            }),
        })
    }

    /// Enqueues `task`, blocking while the queue is full.
    ///
    /// After the task is queued a worker is started if none is idle and the
    /// pool is below its limit.
    pub fn submit<F>(&self, task: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = &self.shared;
        shared.queue.put(Box::new(task), &shared.cancel)?;

        let mut pool = sync::lock(&shared.pool);
        if shared.idle.load(Ordering::SeqCst) == 0 && pool.alive < shared.max_workers {
            Self::spawn_worker(shared, &mut pool)?;
        }
        Ok(())
    }

    fn spawn_worker(shared: &Arc<Shared>, pool: &mut Pool) -> Result<(), ExecutorError> {
        pool.reap_finished();

        let n = pool.spawned + 1;
        let name = format!("executor-worker-{n}");
        let worker = Arc::clone(shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&worker))?;

        pool.spawned = n;
        pool.alive += 1;
        pool.handles.push(handle);
        debug!(worker = %name, alive = pool.alive, "worker spawned");
        Ok(())
    }

    /// Tasks waiting in the queue.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Workers currently alive, busy or idle.
    pub fn worker_count(&self) -> usize {
        sync::lock(&self.shared.pool).alive
    }

    pub fn idle_count(&self) -> usize {
        self.shared.idle.load(Ordering::SeqCst)
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    /// `true` once [`join`](Self::join) or [`shutdown`](Self::shutdown) closed
    /// the queue.
    pub fn is_closed(&self) -> bool {
        self.shared.queue.is_closed()
    }

    /// Closes the queue, lets the workers drain it, and joins them.
    pub fn shutdown(self) {
        self.join();
    }

    /// Like [`shutdown`](Self::shutdown) but keeps the executor around so its
    /// counters can still be read. Later submissions fail with `Closed`.
    ///
    /// Idempotent: later calls find no handles left to join.
    pub fn join(&self) {
        self.shared.queue.producer_finished();
        let handles = std::mem::take(&mut sync::lock(&self.shared.pool).handles);
        for handle in handles {
            if handle.join().is_err() {
                warn!("executor worker exited by panic");
            }
        }
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_worker(shared: &Shared) {
    loop {
        shared.idle.fetch_add(1, Ordering::SeqCst);
        let next = shared.queue.get_timeout(&shared.cancel, shared.idle_timeout);
        shared.idle.fetch_sub(1, Ordering::SeqCst);

        match next {
            Ok(Some(task)) => {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    warn!("task panicked; worker continues");
                }
            }
            Err(BufferError::Timeout) => {
                let mut pool = sync::lock(&shared.pool);
                // A task queued after the timeout fired is picked up here
                // rather than stranded.
                if shared.queue.is_empty() {
                    pool.alive -= 1;
                    debug!(alive = pool.alive, "idle worker retired");
                    return;
                }
            }
            Ok(None) => {
                sync::lock(&shared.pool).alive -= 1;
                debug!("worker exiting: queue closed and drained");
                return;
            }
            Err(err) => {
                sync::lock(&shared.pool).alive -= 1;
                warn!(error = %err, "worker stopped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_rejects_zero_workers() {
        assert!(matches!(
            TaskExecutor::new(4, 0),
            Err(ExecutorError::InvalidWorkers)
        ));
        assert!(matches!(
            TaskExecutor::new(0, 2),
            Err(ExecutorError::Buffer(BufferError::InvalidCapacity))
        ));
    }

    #[test]
    fn test_spawns_lazily() {
        let executor = TaskExecutor::new(4, 3).unwrap();
        assert_eq!(executor.worker_count(), 0);

        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(7).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
        assert!(executor.worker_count() >= 1);
        assert!(executor.worker_count() <= 3);
    }

    #[test]
    fn test_worker_limit_respected() {
        let executor = TaskExecutor::new(16, 2).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        for _ in 0..6 {
            let release_rx = Arc::clone(&release_rx);
            executor
                .submit(move || {
                    let _ = sync::lock(&release_rx).recv();
                })
                .unwrap();
        }
        assert!(executor.worker_count() <= 2);

        for _ in 0..6 {
            release_tx.send(()).unwrap();
        }
        executor.shutdown();
    }

    #[test]
    fn test_idle_workers_retire() {
        let executor =
            TaskExecutor::with_idle_timeout(4, 2, Duration::from_millis(50)).unwrap();
        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while executor.worker_count() > 0 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(executor.worker_count(), 0);

        // A later submission starts a fresh worker.
        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(()).unwrap()).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_retired_workers_are_reaped() {
        let executor =
            TaskExecutor::with_idle_timeout(4, 1, Duration::from_millis(10)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);

        for _ in 0..20 {
            let (tx, rx) = mpsc::channel();
            executor.submit(move || tx.send(()).unwrap()).unwrap();
            rx.recv_timeout(Duration::from_secs(5)).unwrap();

            // Wait for the worker to retire and its thread to end.
            loop {
                let pool = sync::lock(&executor.shared.pool);
                if pool.alive == 0 && pool.handles.iter().all(JoinHandle::is_finished) {
                    break;
                }
                drop(pool);
                assert!(std::time::Instant::now() < deadline, "worker never retired");
                thread::sleep(Duration::from_millis(5));
            }
        }

        // Each spawn joined the previous, retired worker.
        assert_eq!(sync::lock(&executor.shared.pool).handles.len(), 1);
        assert_eq!(sync::lock(&executor.shared.pool).spawned, 20);
        executor.shutdown();
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let executor = TaskExecutor::new(4, 1).unwrap();
        executor.submit(|| panic!("boom")).unwrap();

        let (tx, rx) = mpsc::channel();
        executor.submit(move || tx.send(1).unwrap()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        assert_eq!(executor.worker_count(), 1);
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let executor = TaskExecutor::new(32, 2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let done = Arc::clone(&done);
            executor
                .submit(move || {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        executor.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_join_keeps_counters_readable() {
        let executor = TaskExecutor::new(4, 2).unwrap();
        executor.submit(|| panic!("boom")).unwrap();
        executor.submit(|| {}).unwrap();
        executor.join();

        assert!(executor.is_closed());
        assert_eq!(executor.queue_len(), 0);
        assert_eq!(executor.worker_count(), 0);
        assert!(matches!(
            executor.submit(|| {}),
            Err(ExecutorError::Buffer(BufferError::Closed))
        ));
    }
}
