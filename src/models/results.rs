use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Row, UpdateStatistics};

/// Totals for one level of accounting (whole batches, or individual operations).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: u64,
    pub committed: u64,
    pub failed: u64,
    pub errors: BTreeMap<String, u64>,
}

/// Immutable summary of one batched iteration.
///
/// `total` counts rows accepted for submission, not rows finished: under cancellation it
/// can exceed `committed_operations + failed_operations`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAndTotalResult {
    pub batches: u64,
    pub total: u64,
    /// Wall-clock seconds spent in the dispatch
    pub time_taken: u64,
    pub committed_operations: u64,
    pub failed_operations: u64,
    pub failed_batches: u64,
    pub retries: u64,
    /// Batch-level errors, message to count
    pub error_messages: BTreeMap<String, u64>,
    pub batch: BatchSummary,
    pub operations: BatchSummary,
    pub was_terminated: bool,
    /// Sample of rows from failed batches, keyed by batch index
    pub failed_params: BTreeMap<String, Vec<Row>>,
    pub update_statistics: UpdateStatistics,
}

impl BatchAndTotalResult {
    /// Whether every accepted row is accounted for as committed or failed.
    pub fn is_fully_accounted(&self) -> bool {
        self.committed_operations + self.failed_operations == self.total
    }
}

/// Summary of a run-down commit loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownResult {
    pub updates: u64,
    pub executions: u64,
    pub time_taken: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub batch_errors: BTreeMap<String, u64>,
    pub failed_commits: u64,
    pub commit_errors: BTreeMap<String, u64>,
    pub was_terminated: bool,
}
