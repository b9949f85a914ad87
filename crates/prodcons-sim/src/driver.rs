//! Thread orchestration for one simulation run.
//!
//! Producers and consumers are named scoped threads (`P-<i>`, `C-<i>`)
//! started in a shuffled order. A monitor thread logs occupancy every
//! [`MONITOR_PERIOD`] until the run ends. Any failing thread cancels the run's
//! [`CancelToken`] so no peer stays blocked on a buffer that will never move.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_utils::thread::{self, Scope, ScopedJoinHandle};
use prodcons_rs::{
    BatchError, Buffer, BufferError, CancelToken, Config, ExecutorError, FanoutBuffer, Message,
    ProdCons, ProducerGuard, ProducerId, TaskExecutor,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{Mode, SimError, SimOptions};
use crate::report::Report;

/// Interval between monitor log lines.
pub const MONITOR_PERIOD: Duration = Duration::from_millis(500);

type Item = Message<u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Producer(usize),
    Consumer(usize),
}

/// Random draws made once, up front, so a seed reproduces the whole plan.
#[derive(Debug)]
struct Plan {
    quotas: Vec<usize>,
    order: Vec<Role>,
}

impl Plan {
    fn draw(opts: &SimOptions) -> Self {
        let mut rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let quotas = (0..opts.n_prod)
            .map(|_| rng.gen_range(opts.min_prod..=opts.max_prod))
            .collect();

        let consumers = if opts.mode == Mode::Executor { 0 } else { opts.n_cons };
        let mut order: Vec<Role> = (0..opts.n_prod)
            .map(Role::Producer)
            .chain((0..consumers).map(Role::Consumer))
            .collect();
        order.shuffle(&mut rng);

        Self { quotas, order }
    }

    fn messages(&self) -> u64 {
        self.quotas.iter().sum::<usize>() as u64
    }
}

/// Buffer-side totals read once every thread has been joined.
struct Tally {
    admitted: u64,
    consumed: u64,
    final_size: usize,
    closed: bool,
}

/// Runs one simulation to completion and reports the outcome.
pub fn run(opts: &SimOptions) -> Result<Report, SimError> {
    opts.validate()?;
    let plan = Plan::draw(opts);
    info!(mode = %opts.mode, quotas = ?plan.quotas, "simulation starting");

    let started = Instant::now();
    let config = Config::new(opts.buf_sz, true);
    let (expected, tally) = match opts.mode {
        Mode::Plain => {
            let buffer = Buffer::new(config)?;
            let tally = run_buffer(
                opts,
                &plan,
                &buffer,
                |producer, message| producer.put(message),
                |buffer: &Buffer<Item>, cancel| Ok(buffer.get(cancel)?.into_iter().collect()),
            )?;
            (plan.messages(), tally)
        }
        Mode::Batch => {
            let buffer = Buffer::new(config)?;
            let tally = run_buffer(
                opts,
                &plan,
                &buffer,
                |producer, message| producer.put(message),
                |buffer: &Buffer<Item>, cancel| {
                    buffer.get_batch(opts.k, cancel).map_err(BatchError::into_cause)
                },
            )?;
            (plan.messages(), tally)
        }
        Mode::Fanout => {
            let buffer = FanoutBuffer::new(config)?;
            let tally = run_buffer(
                opts,
                &plan,
                &buffer,
                |producer, message| producer.put_copies(message, opts.n_copies),
                |buffer: &FanoutBuffer<Item>, cancel| {
                    Ok(buffer.get(cancel)?.into_iter().collect())
                },
            )?;
            (plan.messages() * opts.n_copies as u64, tally)
        }
        Mode::Executor => (plan.messages(), run_executor(opts, &plan)?),
    };

    let report = Report {
        mode: opts.mode,
        producers: opts.n_prod,
        consumers: opts.n_cons,
        capacity: opts.buf_sz,
        quotas: plan.quotas,
        expected,
        admitted: tally.admitted,
        consumed: tally.consumed,
        final_size: tally.final_size,
        closed: tally.closed,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(passed = report.passed(), elapsed_ms = report.elapsed_ms, "simulation finished");
    Ok(report)
}

// =============================================================================
// Buffer modes
// =============================================================================

fn run_buffer<B, P, C>(
    opts: &SimOptions,
    plan: &Plan,
    buffer: &B,
    produce: P,
    consume: C,
) -> Result<Tally, SimError>
where
    B: ProdCons<Item> + Clone + Sync,
    P: Fn(&ProducerGuard<Item, B>, Item) -> Result<(), BufferError> + Sync,
    C: Fn(&B, &CancelToken) -> Result<Vec<Item>, BufferError> + Sync,
{
    buffer.configure_expected_producers(opts.n_prod);
    let cancel = CancelToken::new();
    let done = AtomicBool::new(false);
    let consumed = AtomicU64::new(0);
    let prod_pause = Duration::from_millis(opts.prod_time_ms);
    let cons_pause = Duration::from_millis(opts.cons_time_ms);

    let outcome = thread::scope(|s| {
        let (cancel, done, consumed) = (&cancel, &done, &consumed);
        let (produce, consume) = (&produce, &consume);

        let monitor = spawn_monitor(s, done, move || (buffer.len(), buffer.total_admitted()))?;
        let mut handles = Vec::with_capacity(plan.order.len());
        for &role in &plan.order {
            let spawned = match role {
                Role::Producer(i) => {
                    let quota = plan.quotas[i];
                    s.builder()
                        .name(format!("P-{}", i + 1))
                        .spawn(move |_| produce_quota(buffer, cancel, quota, prod_pause, produce))
                }
                Role::Consumer(i) => s
                    .builder()
                    .name(format!("C-{}", i + 1))
                    .spawn(move |_| drain(buffer, cancel, cons_pause, consume, consumed)),
            };
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    cancel.cancel();
                    stop_monitor(done, &monitor);
                    return Err(SimError::Spawn(err));
                }
            }
        }

        let result = join_all(handles);
        stop_monitor(done, &monitor);
        result
    })
    .map_err(|_| SimError::ThreadPanicked)?;
    outcome?;

    Ok(Tally {
        admitted: buffer.total_admitted(),
        consumed: consumed.load(Ordering::SeqCst),
        final_size: buffer.len(),
        closed: buffer.is_closed(),
    })
}

/// Puts `quota` messages through a registered producer.
///
/// The guard reports the producer finished on every exit path.
fn produce_quota<B, P>(
    buffer: &B,
    cancel: &CancelToken,
    quota: usize,
    pause: Duration,
    produce: &P,
) -> Result<(), BufferError>
where
    B: ProdCons<Item> + Clone,
    P: Fn(&ProducerGuard<Item, B>, Item) -> Result<(), BufferError>,
{
    let producer = buffer
        .register_producer(cancel)
        .map_err(|err| abort(cancel, err))?;

    for seq in 0..quota as u64 {
        let message = producer.message(seq);
        let id = message.id();
        produce(&producer, message).map_err(|err| abort(cancel, err))?;
        info!(producer = %producer.id(), message = id, seq, "put");
        std::thread::sleep(pause);
    }
    debug!(producer = %producer.id(), quota, "quota produced");
    Ok(())
}

/// Consumes until the end-of-stream sentinel.
fn drain<B, C>(
    buffer: &B,
    cancel: &CancelToken,
    pause: Duration,
    consume: &C,
    consumed: &AtomicU64,
) -> Result<(), BufferError>
where
    C: Fn(&B, &CancelToken) -> Result<Vec<Item>, BufferError>,
{
    loop {
        let items = consume(buffer, cancel).map_err(|err| abort(cancel, err))?;
        if items.is_empty() {
            debug!("end of stream");
            return Ok(());
        }
        for message in &items {
            info!(%message, "get");
        }
        consumed.fetch_add(items.len() as u64, Ordering::SeqCst);
        std::thread::sleep(pause);
    }
}

// =============================================================================
// Executor mode
// =============================================================================

fn run_executor(opts: &SimOptions, plan: &Plan) -> Result<Tally, SimError> {
    let executor = TaskExecutor::new(opts.buf_sz, opts.n_cons)?;
    let submitted = AtomicU64::new(0);
    let executed = Arc::new(AtomicU64::new(0));
    let next_id = AtomicU64::new(1);
    let done = AtomicBool::new(false);
    let prod_pause = Duration::from_millis(opts.prod_time_ms);
    let task_pause = Duration::from_millis(opts.cons_time_ms);

    let outcome = thread::scope(|s| {
        let (executor, submitted, executed, next_id, done) =
            (&executor, &submitted, &executed, &next_id, &done);

        let monitor = spawn_monitor(s, done, move || {
            (executor.queue_len(), submitted.load(Ordering::SeqCst))
        })?;
        let mut handles = Vec::with_capacity(plan.order.len());
        for &role in &plan.order {
            let Role::Producer(i) = role else { continue };
            let quota = plan.quotas[i];
            let spawned = s.builder().name(format!("P-{}", i + 1)).spawn(move |_| {
                let producer = ProducerId::new(i as u64 + 1);
                for seq in 0..quota as u64 {
                    let message = Message::new(next_id.fetch_add(1, Ordering::SeqCst), producer, seq);
                    let executed = Arc::clone(executed);
                    executor.submit(move || {
                        info!(%message, "task run");
                        std::thread::sleep(task_pause);
                        executed.fetch_add(1, Ordering::SeqCst);
                    })?;
                    submitted.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(prod_pause);
                }
                Ok::<(), ExecutorError>(())
            });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    stop_monitor(done, &monitor);
                    return Err(SimError::Spawn(err));
                }
            }
        }

        let result = join_all(handles);
        // Returns once the workers drained the queue. A task that panicked
        // is never counted as executed, which fails the report.
        executor.join();
        stop_monitor(done, &monitor);
        result
    })
    .map_err(|_| SimError::ThreadPanicked)?;
    outcome?;

    debug!(executed = executed.load(Ordering::SeqCst), "executor drained");
    Ok(Tally {
        admitted: submitted.load(Ordering::SeqCst),
        consumed: executed.load(Ordering::SeqCst),
        final_size: executor.queue_len(),
        closed: executor.is_closed(),
    })
}

// =============================================================================
// Shared helpers
// =============================================================================

fn abort(cancel: &CancelToken, err: BufferError) -> BufferError {
    if !err.is_cancelled() {
        warn!(error = %err, "thread failed; cancelling run");
        cancel.cancel();
    }
    err
}

/// Joins every handle, keeping the first error that is not a knock-on
/// cancellation.
fn join_all<E>(handles: Vec<ScopedJoinHandle<'_, Result<(), E>>>) -> Result<(), SimError>
where
    E: Into<SimError>,
{
    let mut first: Option<SimError> = None;
    let mut panicked = false;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let err = err.into();
                let knock_on = matches!(err, SimError::Buffer(BufferError::Cancelled));
                if first.is_none() || (!knock_on && first_is_cancel(first.as_ref())) {
                    first = Some(err);
                }
            }
            Err(_) => panicked = true,
        }
    }
    if panicked {
        return Err(SimError::ThreadPanicked);
    }
    first.map_or(Ok(()), Err)
}

fn first_is_cancel(err: Option<&SimError>) -> bool {
    matches!(err, Some(SimError::Buffer(BufferError::Cancelled)))
}

fn spawn_monitor<'scope, 'env, F>(
    s: &'scope Scope<'env>,
    done: &'env AtomicBool,
    snapshot: F,
) -> Result<ScopedJoinHandle<'scope, ()>, SimError>
where
    F: Fn() -> (usize, u64) + Send + 'env,
{
    s.builder()
        .name("Monitor".to_string())
        .spawn(move |_| {
            while !done.load(Ordering::SeqCst) {
                let (size, total) = snapshot();
                info!(size, total_admitted = total, "stat");
                std::thread::park_timeout(MONITOR_PERIOD);
            }
        })
        .map_err(SimError::Spawn)
}

fn stop_monitor(done: &AtomicBool, monitor: &ScopedJoinHandle<'_, ()>) {
    done.store(true, Ordering::SeqCst);
    monitor.thread().unpark();
}
