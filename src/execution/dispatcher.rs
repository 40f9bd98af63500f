//! # Batch Dispatcher
//!
//! Drives a [`RowSource`] to exhaustion as fixed-size batches, each committed in its own
//! transaction on the [`ExecutionPool`].
//!
//! The pull loop never blocks on capacity. When the in-flight count has reached the
//! concurrency limit it sleeps for `poll_interval` and re-checks, so a termination request
//! is observed within one poll interval even when every worker is busy.
//!
//! Rows are counted when their batch is submitted, not when it completes. Under
//! cancellation `total` can therefore exceed the committed and failed operations combined.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::defaults;
use crate::error::{PeriodicError, Result};
use crate::execution::batch::{BatchConsumer, BatchRows, BatchRunner, ExecuteBatch, RetryPolicy};
use crate::execution::collector::BatchAndTotalCollector;
use crate::execution::pool::{ExecutionPool, TaskHandle};
use crate::execution::source::RowSource;
use crate::execution::store::Store;
use crate::execution::termination::TerminationGuard;
use crate::logging::log_errors;
use crate::models::BatchAndTotalResult;

/// Knobs of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Maximum rows per batch
    pub batch_size: usize,
    /// Maximum batches in flight when `parallel` is set
    pub concurrency: usize,
    pub parallel: bool,
    /// Bind each batch as a list (`true`) or row by row (`false`)
    pub iterate_list: bool,
    pub retry: RetryPolicy,
    /// Rows of each failed batch kept in the summary; `None` keeps none
    pub failed_params: Option<usize>,
    /// Pause between capacity checks
    pub poll_interval: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE as usize,
            concurrency: 1,
            parallel: false,
            iterate_list: true,
            retry: RetryPolicy::default(),
            failed_params: None,
            poll_interval: defaults::POLL_INTERVAL,
        }
    }
}

impl DispatchOptions {
    pub fn new(batch_size: usize, concurrency: usize) -> Self {
        Self {
            batch_size,
            concurrency,
            ..Self::default()
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn iterate_list(mut self, iterate_list: bool) -> Self {
        self.iterate_list = iterate_list;
        self
    }

    pub fn retries(mut self, retries: u64) -> Self {
        self.retry.retries = retries;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn failed_params(mut self, failed_params: Option<usize>) -> Self {
        self.failed_params = failed_params;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reject sizes that could never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size < 1 {
            return Err(PeriodicError::ConfigurationError(
                "batchSize parameter must be greater than zero".to_string(),
            ));
        }
        if self.concurrency < 1 {
            return Err(PeriodicError::ConfigurationError(
                "concurrency parameter must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Serial dispatch keeps one batch in flight whatever `concurrency` says.
    pub fn effective_concurrency(&self) -> usize {
        if self.parallel {
            self.concurrency
        } else {
            1
        }
    }
}

/// Releases an in-flight slot when its batch unit ends, however it ends.
struct InFlightSlot(Arc<AtomicUsize>);

impl InFlightSlot {
    fn acquire(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct Submitted {
    index: u64,
    rows: usize,
    handle: TaskHandle<u64>,
}

/// Execute `consumer` over every row of `source` in batches and return the accounting.
///
/// Only invalid options fail the call. Batch and operation failures, panics included, are
/// reported in the returned summary.
pub async fn iterate_and_execute_batched(
    store: Arc<dyn Store>,
    pool: &ExecutionPool,
    guard: Arc<dyn TerminationGuard>,
    options: &DispatchOptions,
    mut source: Box<dyn RowSource>,
    consumer: Arc<dyn BatchConsumer>,
) -> Result<BatchAndTotalResult> {
    options.validate()?;

    let run_id = Uuid::new_v4();
    let concurrency = options.effective_concurrency();
    let collector = Arc::new(BatchAndTotalCollector::new(options.failed_params));
    let runner = Arc::new(BatchRunner::new(
        run_id,
        store,
        consumer,
        Arc::clone(&collector),
        Arc::clone(&guard),
        options.retry,
    ));

    info!(
        run_id = %run_id,
        batch_size = options.batch_size,
        concurrency = concurrency,
        parallel = options.parallel,
        iterate_list = options.iterate_list,
        retries = options.retry.retries,
        "Starting batched dispatch"
    );

    let in_flight = Arc::new(AtomicUsize::new(0));
    let mut submitted: Vec<Submitted> = Vec::new();
    let mut index = 0u64;

    while source.has_next() {
        if guard.is_terminated() {
            debug!(run_id = %run_id, batches = index, "Termination observed, stopping pull loop");
            break;
        }
        if in_flight.load(Ordering::Acquire) >= concurrency {
            tokio::time::sleep(options.poll_interval).await;
            continue;
        }

        let rows = source.take(options.batch_size);
        if rows.is_empty() {
            break;
        }
        let size = rows.len();
        let offset = collector.count();
        collector.increment_count(size as u64);
        collector.increment_batches();

        let batch = ExecuteBatch::new(options.iterate_list, BatchRows::new(index, offset, rows));
        let slot = InFlightSlot::acquire(&in_flight);
        let runner = Arc::clone(&runner);
        let handle = pool.submit(options.parallel, move |signal| async move {
            let _slot = slot;
            runner.run(batch, signal).await
        });
        submitted.push(Submitted {
            index,
            rows: size,
            handle,
        });
        index += 1;
    }

    for Submitted {
        index,
        rows,
        handle,
    } in submitted
    {
        let outcome = if guard.is_terminated() {
            handle.join_or_cancel().await
        } else {
            handle.join().await.map(Some)
        };
        match outcome {
            Ok(Some(applied)) => collector.increment_successes(applied),
            Ok(None) => debug!(run_id = %run_id, batch = index, "Unfinished batch left behind"),
            Err(e) => {
                warn!(run_id = %run_id, batch = index, error = %e, "Batch unit failed");
                collector.record_batch_error(e.to_string(), 1);
                collector.increment_failed_operations(rows as u64);
            }
        }
    }

    let result = collector.snapshot(guard.is_terminated());
    log_errors(&format!("Error processing batch [{run_id}]"), &result.error_messages);
    log_errors(
        &format!("Error processing operations [{run_id}]"),
        &result.operations.errors,
    );
    info!(
        run_id = %run_id,
        batches = result.batches,
        total = result.total,
        committed = result.committed_operations,
        failed = result.failed_operations,
        failed_batches = result.failed_batches,
        retries = result.retries,
        was_terminated = result.was_terminated,
        "Batched dispatch finished"
    );

    Ok(result)
}
