//! # Run-down Commit
//!
//! Repeats a `LIMIT`-bounded statement, each execution in its own transaction, until it
//! reports that nothing was left to update.

use regex::RegexBuilder;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::{COUNT_PARAM, TOTAL_PARAM};
use crate::error::{PeriodicError, Result, StoreError};
use crate::execution::store::{rollback_quietly, Store};
use crate::execution::termination::TerminationGuard;
use crate::logging::log_errors;
use crate::models::{merge_params, Params, Row, RundownResult};

/// Fail unless `statement` bounds its own work with a `LIMIT` clause.
pub fn require_limit(statement: &str) -> Result<()> {
    let limit = RegexBuilder::new(r"\bLIMIT\b")
        .case_insensitive(true)
        .build()
        .map_err(|e| PeriodicError::ConfigurationError(e.to_string()))?;
    if limit.is_match(statement) {
        Ok(())
    } else {
        Err(PeriodicError::ConfigurationError(
            "the statement sent to commit must contain a `limit`".to_string(),
        ))
    }
}

/// How one run-down execution ended.
enum Step {
    Updated(u64),
    /// The statement failed and its transaction was rolled back
    StatementFailed(StoreError),
    /// The statement ran but its transaction could not be opened or committed
    CommitFailed(StoreError),
}

async fn execute_step(store: &dyn Store, statement: &str, params: &Params) -> Step {
    let mut tx = match store.begin().await {
        Ok(tx) => tx,
        Err(e) => return Step::CommitFailed(e),
    };
    let rows = match tx.query(statement, params).await {
        Ok(rows) => rows,
        Err(e) => {
            rollback_quietly(tx).await;
            return Step::StatementFailed(e);
        }
    };
    match tx.commit().await {
        Ok(()) => Step::Updated(updates_of(&rows)),
        Err(e) => Step::CommitFailed(e),
    }
}

/// Number of updates reported by one execution: the first column of the first row.
fn updates_of(rows: &[Row]) -> u64 {
    rows.first()
        .and_then(|row| row.values().next())
        .and_then(Value::as_u64)
        .unwrap_or(0)
}

/// Execute `statement` until it reports zero updates, fails, or the invocation terminates.
///
/// Each execution sees `_count` and `_total`, the updates applied so far.
pub async fn run_down(
    store: &dyn Store,
    guard: &dyn TerminationGuard,
    statement: &str,
    params: &Params,
) -> Result<RundownResult> {
    require_limit(statement)?;

    let run_id = Uuid::new_v4();
    let started_at = Instant::now();
    let mut total = 0u64;
    let mut executions = 0u64;
    let mut batches = 0u64;
    let mut failed_batches = 0u64;
    let mut batch_errors: BTreeMap<String, u64> = BTreeMap::new();
    let mut failed_commits = 0u64;
    let mut commit_errors: BTreeMap<String, u64> = BTreeMap::new();

    info!(run_id = %run_id, "Starting run-down commit");
    loop {
        let mut window = Params::new();
        window.insert(COUNT_PARAM.to_string(), Value::from(total));
        window.insert(TOTAL_PARAM.to_string(), Value::from(total));

        batches += 1;
        let updates = match execute_step(store, statement, &merge_params(params, window)).await {
            Step::Updated(updates) => updates,
            Step::StatementFailed(e) => {
                warn!(run_id = %run_id, batch = batches, error = %e, "Run-down execution failed");
                failed_batches += 1;
                *batch_errors.entry(e.message().to_string()).or_insert(0) += 1;
                0
            }
            Step::CommitFailed(e) => {
                warn!(run_id = %run_id, batch = batches, error = %e, "Run-down commit failed");
                failed_commits += 1;
                *commit_errors.entry(e.message().to_string()).or_insert(0) += 1;
                0
            }
        };
        if updates > 0 {
            executions += 1;
            total += updates;
        }
        debug!(run_id = %run_id, batch = batches, updates = updates, total = total, "Run-down step");

        if updates == 0 || guard.is_terminated() {
            break;
        }
    }

    log_errors(&format!("Error during run-down commit [{run_id}]"), &batch_errors);
    log_errors(&format!("Error committing run-down [{run_id}]"), &commit_errors);
    let result = RundownResult {
        updates: total,
        executions,
        time_taken: started_at.elapsed().as_secs(),
        batches,
        failed_batches,
        batch_errors,
        failed_commits,
        commit_errors,
        was_terminated: guard.is_terminated(),
    };
    info!(
        run_id = %run_id,
        updates = result.updates,
        executions = result.executions,
        failed_batches = result.failed_batches,
        failed_commits = result.failed_commits,
        "Run-down commit finished"
    );
    Ok(result)
}
