//! # Execution Pool
//!
//! Worker and scheduler substrate shared by the batch dispatcher and the job scheduler.
//!
//! Units of work run as tokio tasks. The parallel pool is bounded by a semaphore sized
//! from `pool.worker_threads`; the serial pool holds a single permit so its units never
//! overlap. Timed and repeating jobs run on the scheduler handle.
//!
//! Every unit is paired with a [`CancelSignal`]. Cancelling is never forceful: a unit that
//! has started runs to completion, the signal only stops work that has not begun yet and
//! wakes jobs sleeping between runs.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{PeriodicError, Result};

/// Non-forceful cancellation shared between a handle and its running unit.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // notify_one keeps a permit when nobody is waiting yet, so a cancel that lands
        // just before the unit starts sleeping is not lost.
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless cancelled first. Returns `true` when the full duration
    /// elapsed without cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_cancelled(),
            _ = self.notify.notified() => false,
        }
    }
}

/// Handle to a unit of work submitted to the worker pools.
#[derive(Debug)]
pub struct TaskHandle<T> {
    join: JoinHandle<T>,
    signal: Arc<CancelSignal>,
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request cancellation. A unit that has not started yet skips its work; one already
    /// running is left alone.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    pub fn signal(&self) -> Arc<CancelSignal> {
        Arc::clone(&self.signal)
    }

    /// Wait for the unit's output. A panic inside the unit is returned as
    /// [`PeriodicError::TaskFailed`].
    pub async fn join(self) -> Result<T> {
        self.join
            .await
            .map_err(|e| PeriodicError::TaskFailed(join_error_message(e)))
    }

    /// Output of a finished unit, or `None` after cancelling one that is still pending or
    /// running.
    pub async fn join_or_cancel(self) -> Result<Option<T>> {
        if self.is_finished() {
            self.join().await.map(Some)
        } else {
            self.cancel();
            Ok(None)
        }
    }
}

fn join_error_message(e: tokio::task::JoinError) -> String {
    if e.is_panic() {
        panic_message(e.into_panic())
    } else {
        e.to_string()
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Cloneable handle to a scheduled job.
#[derive(Debug, Clone, Default)]
pub struct JobHandle {
    signal: Arc<CancelSignal>,
    done: Arc<AtomicBool>,
    runs: Arc<AtomicU64>,
}

impl JobHandle {
    fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.signal.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// The job will not run again: it completed, failed, or observed its cancellation.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Completed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Acquire)
    }

    fn record_run(&self) {
        self.runs.fetch_add(1, Ordering::AcqRel);
    }

    fn done_on_drop(&self) -> DoneGuard {
        DoneGuard(Arc::clone(&self.done))
    }
}

/// Marks a job done however its loop exits.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Repeating job body. `Err` stops the repeat chain.
pub type ScheduledRun =
    Arc<dyn Fn() -> futures::future::BoxFuture<'static, Result<()>> + Send + Sync>;

/// Shortest repeat interval a job runs at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
enum Cadence {
    Once,
    FixedDelay(Duration),
    FixedRate(Duration),
}

#[derive(Debug, Clone)]
pub struct ExecutionPool {
    workers: Handle,
    scheduler: Handle,
    parallel: Arc<Semaphore>,
    serial: Arc<Semaphore>,
    worker_threads: usize,
}

impl ExecutionPool {
    /// Pool on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like [`Handle::current`].
    pub fn new(config: &PoolConfig) -> Self {
        let handle = Handle::current();
        Self::with_handles(config, handle.clone(), handle)
    }

    /// Pool with explicit worker and scheduler runtimes.
    pub fn with_handles(config: &PoolConfig, workers: Handle, scheduler: Handle) -> Self {
        let worker_threads = config.worker_threads.max(1);
        Self {
            workers,
            scheduler,
            parallel: Arc::new(Semaphore::new(worker_threads)),
            serial: Arc::new(Semaphore::new(1)),
            worker_threads,
        }
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Submit a unit to the parallel pool, or to the serial pool when `parallel` is false.
    ///
    /// The unit receives the cancellation signal of the returned handle so it can skip
    /// work that was cancelled before it began.
    pub fn submit<F, Fut, T>(&self, parallel: bool, unit: F) -> TaskHandle<T>
    where
        F: FnOnce(Arc<CancelSignal>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let signal = Arc::new(CancelSignal::new());
        let permits = if parallel {
            Arc::clone(&self.parallel)
        } else {
            Arc::clone(&self.serial)
        };
        let unit_signal = Arc::clone(&signal);
        let join = self.workers.spawn(async move {
            // The semaphores are never closed, so acquire only fails if that changes.
            let _permit = permits.acquire_owned().await.ok();
            unit(unit_signal).await
        });
        TaskHandle { join, signal }
    }

    /// Run `run` once after `delay`.
    pub fn schedule_once(&self, run: ScheduledRun, delay: Duration) -> JobHandle {
        self.spawn_scheduled(run, delay, Cadence::Once)
    }

    /// Run after `delay`, then `interval` after each run completes.
    pub fn schedule_fixed_delay(
        &self,
        run: ScheduledRun,
        delay: Duration,
        interval: Duration,
    ) -> JobHandle {
        self.spawn_scheduled(run, delay, Cadence::FixedDelay(interval))
    }

    /// Run after `delay`, then every `interval` measured from each run's start. Runs that
    /// overrun their slot delay the next one; they never overlap.
    pub fn schedule_fixed_rate(
        &self,
        run: ScheduledRun,
        delay: Duration,
        interval: Duration,
    ) -> JobHandle {
        self.spawn_scheduled(run, delay, Cadence::FixedRate(interval))
    }

    fn spawn_scheduled(&self, run: ScheduledRun, delay: Duration, cadence: Cadence) -> JobHandle {
        let handle = JobHandle::new();
        let job = handle.clone();

        self.scheduler.spawn(async move {
            let _done = job.done_on_drop();
            if !job.signal.sleep(delay).await {
                debug!("Scheduled job cancelled before its first run");
                return;
            }

            match cadence {
                Cadence::Once => {
                    if run_guarded(&run).await.is_ok() {
                        job.record_run();
                    }
                }
                Cadence::FixedDelay(interval) => {
                    let pause = interval.max(MIN_INTERVAL);
                    loop {
                        if run_guarded(&run).await.is_err() {
                            break;
                        }
                        job.record_run();
                        if !job.signal.sleep(pause).await {
                            break;
                        }
                    }
                }
                Cadence::FixedRate(interval) => {
                    let period = interval.max(MIN_INTERVAL);
                    let mut ticker = tokio::time::interval(period);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {}
                            _ = job.signal.notify.notified() => break,
                        }
                        if job.signal.is_cancelled() || run_guarded(&run).await.is_err() {
                            break;
                        }
                        job.record_run();
                    }
                }
            }
        });

        handle
    }
}

/// Run one scheduled execution, turning a panic into an error so the repeat chain stops
/// instead of the scheduler task dying silently.
async fn run_guarded(run: &ScheduledRun) -> Result<()> {
    match AssertUnwindSafe(run()).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload);
            warn!(error = %message, "Scheduled run panicked");
            Err(PeriodicError::TaskFailed(message))
        }
    }
}
