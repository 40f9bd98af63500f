//! # Result Collector
//!
//! Thread-safe accumulator shared by every batch of one dispatch. Counters only ever grow;
//! scalar counters are atomics and error tables sit behind `parking_lot` mutexes, so
//! concurrent workers never lose an update.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::models::{
    BatchAndTotalResult, BatchSummary, QueryStatistics, Row, UpdateStatistics,
};

#[derive(Debug)]
pub struct BatchAndTotalCollector {
    started_at: Instant,
    count: AtomicU64,
    batches: AtomicU64,
    successes: AtomicU64,
    failed_operations: AtomicU64,
    failed_batches: AtomicU64,
    retries: AtomicU64,
    batch_errors: Mutex<BTreeMap<String, u64>>,
    operation_errors: Mutex<BTreeMap<String, u64>>,
    failed_params_limit: Option<usize>,
    failed_params: Mutex<BTreeMap<String, Vec<Row>>>,
    updates: Mutex<UpdateStatistics>,
}

impl Default for BatchAndTotalCollector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BatchAndTotalCollector {
    /// `failed_params_limit` caps how many rows of each failed batch are kept; `None`
    /// keeps none.
    pub fn new(failed_params_limit: Option<usize>) -> Self {
        Self {
            started_at: Instant::now(),
            count: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            failed_batches: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            batch_errors: Mutex::new(BTreeMap::new()),
            operation_errors: Mutex::new(BTreeMap::new()),
            failed_params_limit,
            failed_params: Mutex::new(BTreeMap::new()),
            updates: Mutex::new(UpdateStatistics::new()),
        }
    }

    /// Rows accepted so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Acquire)
    }

    pub fn increment_count(&self, rows: u64) {
        self.count.fetch_add(rows, Ordering::AcqRel);
    }

    pub fn increment_batches(&self) {
        self.batches.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::AcqRel);
    }

    pub fn increment_successes(&self, applied: u64) {
        self.successes.fetch_add(applied, Ordering::AcqRel);
    }

    pub fn increment_failed_operations(&self, failed: u64) {
        self.failed_operations.fetch_add(failed, Ordering::AcqRel);
    }

    /// Tally a batch whose transaction could not commit.
    pub fn record_batch_error(&self, message: impl Into<String>, count: u64) {
        self.failed_batches.fetch_add(count, Ordering::AcqRel);
        *self.batch_errors.lock().entry(message.into()).or_insert(0) += count;
    }

    /// Tally operations that failed inside a committed batch.
    pub fn record_operation_error(&self, message: impl Into<String>, count: u64) {
        *self.operation_errors.lock().entry(message.into()).or_insert(0) += count;
    }

    /// Fold the operation-level outcome of a committed batch in. Applied operations are
    /// added separately, once the batch's handle resolves.
    pub fn record_statistics(&self, stats: &QueryStatistics) {
        if stats.failed > 0 {
            self.increment_failed_operations(stats.failed);
        }
        if !stats.errors.is_empty() {
            let mut errors = self.operation_errors.lock();
            for (message, count) in &stats.errors {
                *errors.entry(message.clone()).or_insert(0) += count;
            }
        }
        if !stats.updates.is_empty() {
            self.updates.lock().merge(&stats.updates);
        }
    }

    /// Keep a sample of the rows of failed batch `batch_index`.
    pub fn amend_failed_params(&self, batch_index: u64, rows: &[Row]) {
        if let Some(limit) = self.failed_params_limit {
            let sample = rows.iter().take(limit).cloned().collect();
            self.failed_params
                .lock()
                .insert(batch_index.to_string(), sample);
        }
    }

    pub fn batch_errors(&self) -> BTreeMap<String, u64> {
        self.batch_errors.lock().clone()
    }

    pub fn operation_errors(&self) -> BTreeMap<String, u64> {
        self.operation_errors.lock().clone()
    }

    /// Immutable summary of everything recorded so far.
    pub fn snapshot(&self, was_terminated: bool) -> BatchAndTotalResult {
        let batches = self.batches();
        let total = self.count();
        let committed = self.successes.load(Ordering::Acquire);
        let failed_operations = self.failed_operations.load(Ordering::Acquire);
        let failed_batches = self.failed_batches.load(Ordering::Acquire);
        let batch_errors = self.batch_errors();
        let operation_errors = self.operation_errors();

        BatchAndTotalResult {
            batches,
            total,
            time_taken: self.started_at.elapsed().as_secs(),
            committed_operations: committed,
            failed_operations,
            failed_batches,
            retries: self.retries.load(Ordering::Acquire),
            error_messages: batch_errors.clone(),
            batch: BatchSummary {
                total: batches,
                committed: batches.saturating_sub(failed_batches),
                failed: failed_batches,
                errors: batch_errors,
            },
            operations: BatchSummary {
                total,
                committed,
                failed: failed_operations,
                errors: operation_errors,
            },
            was_terminated,
            failed_params: self.failed_params.lock().clone(),
            update_statistics: self.updates.lock().clone(),
        }
    }
}
