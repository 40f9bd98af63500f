//! # Batch Execution
//!
//! One batch, one transaction. [`ExecuteBatch`] decides how the rows are bound (the whole
//! list at once, or row by row inside the same transaction) and [`BatchRunner`] drives the
//! transaction attempts, retries, and reporting into the collector.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::constants::{defaults, BATCH_PARAM, COUNT_PARAM, RETRY_PARAM};
use crate::error::StoreError;
use crate::execution::collector::BatchAndTotalCollector;
use crate::execution::pool::CancelSignal;
use crate::execution::store::{rollback_quietly, Store, Transaction};
use crate::execution::termination::TerminationGuard;
use crate::logging::log_batch_operation;
use crate::models::{merge_params, Params, QueryStatistics, Row};

/// Work applied to one batch inside an open transaction.
#[async_trait]
pub trait BatchConsumer: Send + Sync {
    async fn apply(
        &self,
        tx: &mut dyn Transaction,
        params: Params,
    ) -> Result<QueryStatistics, StoreError>;
}

/// Runs a fixed statement with the caller's parameters under the batch bindings.
#[derive(Debug, Clone)]
pub struct StatementConsumer {
    statement: String,
    params: Params,
}

impl StatementConsumer {
    pub fn new(statement: impl Into<String>, params: Params) -> Self {
        Self {
            statement: statement.into(),
            params,
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }
}

#[async_trait]
impl BatchConsumer for StatementConsumer {
    async fn apply(
        &self,
        tx: &mut dyn Transaction,
        params: Params,
    ) -> Result<QueryStatistics, StoreError> {
        tx.execute(&self.statement, &merge_params(&self.params, params))
            .await
    }
}

/// Rows of one batch with their position in the stream.
#[derive(Debug, Clone, Default)]
pub struct BatchRows {
    /// Zero-based batch number in pull order
    pub index: u64,
    /// Rows accepted before this batch
    pub offset: u64,
    rows: Vec<Row>,
}

impl BatchRows {
    pub fn new(index: u64, offset: u64, rows: Vec<Row>) -> Self {
        Self {
            index,
            offset,
            rows,
        }
    }
}

/// How a batch is bound into its transaction.
#[derive(Debug, Clone)]
pub enum ExecuteBatch {
    /// One invocation with the whole list bound under `_batch`
    List(BatchRows),
    /// One invocation per row, row fields bound as top-level parameters
    OneByOne(BatchRows),
}

impl ExecuteBatch {
    pub fn new(iterate_list: bool, rows: BatchRows) -> Self {
        if iterate_list {
            ExecuteBatch::List(rows)
        } else {
            ExecuteBatch::OneByOne(rows)
        }
    }

    fn batch(&self) -> &BatchRows {
        match self {
            ExecuteBatch::List(batch) | ExecuteBatch::OneByOne(batch) => batch,
        }
    }

    pub fn index(&self) -> u64 {
        self.batch().index
    }

    pub fn rows(&self) -> &[Row] {
        &self.batch().rows
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// Drop the row references once the batch has been accounted for.
    pub fn release(&mut self) {
        match self {
            ExecuteBatch::List(batch) | ExecuteBatch::OneByOne(batch) => {
                batch.rows = Vec::new();
            }
        }
    }

    /// Apply `consumer` to the batch inside `tx`.
    pub async fn apply(
        &self,
        tx: &mut dyn Transaction,
        consumer: &dyn BatchConsumer,
        attempt: u64,
    ) -> Result<QueryStatistics, StoreError> {
        match self {
            ExecuteBatch::List(batch) => {
                let mut params = Params::new();
                params.insert(COUNT_PARAM.to_string(), Value::from(batch.offset));
                params.insert(
                    BATCH_PARAM.to_string(),
                    Value::Array(batch.rows.iter().cloned().map(Value::Object).collect()),
                );
                params.insert(RETRY_PARAM.to_string(), Value::from(attempt));
                consumer.apply(tx, params).await
            }
            ExecuteBatch::OneByOne(batch) => {
                let mut stats = QueryStatistics::default();
                for (position, row) in batch.rows.iter().enumerate() {
                    let mut params = row.clone();
                    params.insert(
                        COUNT_PARAM.to_string(),
                        Value::from(batch.offset + position as u64),
                    );
                    params.insert(
                        BATCH_PARAM.to_string(),
                        Value::Array(vec![Value::Object(row.clone())]),
                    );
                    params.insert(RETRY_PARAM.to_string(), Value::from(attempt));
                    stats.merge(consumer.apply(tx, params).await?);
                }
                Ok(stats)
            }
        }
    }
}

/// How many times, and how patiently, a failed batch transaction is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u64,
    pub backoff: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            backoff: defaults::RETRY_BACKOFF,
            backoff_max: defaults::RETRY_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u64) -> Self {
        Self {
            retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, backoff: Duration, backoff_max: Duration) -> Self {
        self.backoff = backoff;
        self.backoff_max = backoff_max;
        self
    }

    /// Pause before retry number `attempt` (1-based): doubling from `backoff`, capped.
    pub fn delay(&self, attempt: u64) -> Duration {
        if self.backoff.is_zero() || attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 1).min(16) as u32;
        self.backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.backoff_max)
    }
}

/// Runs batches of one dispatch: transaction, retries, and accounting.
pub struct BatchRunner {
    run_id: Uuid,
    store: Arc<dyn Store>,
    consumer: Arc<dyn BatchConsumer>,
    collector: Arc<BatchAndTotalCollector>,
    guard: Arc<dyn TerminationGuard>,
    retry: RetryPolicy,
}

impl BatchRunner {
    pub fn new(
        run_id: Uuid,
        store: Arc<dyn Store>,
        consumer: Arc<dyn BatchConsumer>,
        collector: Arc<BatchAndTotalCollector>,
        guard: Arc<dyn TerminationGuard>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            run_id,
            store,
            consumer,
            collector,
            guard,
            retry,
        }
    }

    /// Run `batch` to an outcome and return how many operations it applied.
    ///
    /// Failures are recorded in the collector, never returned. No attempt starts once the
    /// invocation is terminated or the batch's handle is cancelled; an attempt already in
    /// its transaction is allowed to finish.
    pub async fn run(&self, mut batch: ExecuteBatch, signal: Arc<CancelSignal>) -> u64 {
        let mut attempt = 0;
        let applied = loop {
            if self.guard.is_terminated() || signal.is_cancelled() {
                debug!(run_id = %self.run_id, batch = batch.index(), "Batch skipped after cancellation");
                break 0;
            }

            match self.run_in_transaction(&batch, attempt).await {
                Ok(stats) => {
                    self.collector.record_statistics(&stats);
                    break stats.applied;
                }
                Err(e) if attempt < self.retry.retries && !self.guard.is_terminated() => {
                    attempt += 1;
                    self.collector.increment_retries();
                    warn!(
                        run_id = %self.run_id,
                        batch = batch.index(),
                        attempt = attempt,
                        error = %e,
                        "Batch transaction failed, retrying"
                    );
                    if !signal.sleep(self.retry.delay(attempt)).await {
                        break 0;
                    }
                }
                Err(e) => {
                    log_batch_operation(
                        "commit",
                        &self.run_id.to_string(),
                        Some(batch.index()),
                        "failed",
                        Some(e.message()),
                    );
                    self.collector.record_batch_error(e.message(), 1);
                    self.collector.increment_failed_operations(batch.len() as u64);
                    self.collector.amend_failed_params(batch.index(), batch.rows());
                    break 0;
                }
            }
        };
        batch.release();
        applied
    }

    async fn run_in_transaction(
        &self,
        batch: &ExecuteBatch,
        attempt: u64,
    ) -> Result<QueryStatistics, StoreError> {
        let mut tx = self.store.begin().await?;
        match batch.apply(tx.as_mut(), self.consumer.as_ref(), attempt).await {
            Ok(stats) => {
                tx.commit().await?;
                Ok(stats)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }
}
