//! # Models
//!
//! Value types flowing through the dispatcher: rows and parameters, per-transaction
//! statistics, and the immutable summaries handed back to callers.

pub mod results;
pub mod statistics;

pub use results::{BatchAndTotalResult, BatchSummary, RundownResult};
pub use statistics::{QueryStatistics, UpdateStatistics};

/// One input record: field name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Parameters bound into a statement execution.
pub type Params = serde_json::Map<String, serde_json::Value>;

/// Merge `overrides` on top of `base`, returning a fresh map.
pub fn merge_params(base: &Params, overrides: Params) -> Params {
    let mut merged = base.clone();
    merged.extend(overrides);
    merged
}
