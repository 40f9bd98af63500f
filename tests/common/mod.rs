#![allow(dead_code)]

pub mod strategies;

pub use strategies::*;

use std::sync::Arc;

use periodic_core::config::PoolConfig;
use periodic_core::execution::{
    iterate_and_execute_batched, BatchConsumer, DispatchOptions, ExecutionPool, IteratorSource,
    NeverTerminated, RowSource, StatementConsumer, TerminationGuard,
};
use periodic_core::models::{BatchAndTotalResult, Params};
use periodic_core::test_utils::{rows, setup_test_environment, MemoryStore};

pub const ACTION: &str = "UNWIND $_batch AS _batch WITH _batch.id AS id  CREATE null";

pub fn pool(worker_threads: usize) -> ExecutionPool {
    setup_test_environment();
    ExecutionPool::new(&PoolConfig { worker_threads })
}

/// `{id}` rows `0..n` behind a row source.
pub fn id_source(n: i64) -> Box<dyn RowSource> {
    Box::new(IteratorSource::new(vec!["id".to_string()], rows(n).into_iter()))
}

pub fn statement_consumer() -> Arc<dyn BatchConsumer> {
    Arc::new(StatementConsumer::new(ACTION, Params::new()))
}

/// Dispatch `n` id rows against `store` with no cancellation.
pub async fn dispatch(store: &Arc<MemoryStore>, options: DispatchOptions, n: i64) -> BatchAndTotalResult {
    dispatch_guarded(store, options, n, Arc::new(NeverTerminated)).await
}

pub async fn dispatch_guarded(
    store: &Arc<MemoryStore>,
    options: DispatchOptions,
    n: i64,
    guard: Arc<dyn TerminationGuard>,
) -> BatchAndTotalResult {
    iterate_and_execute_batched(
        store.clone(),
        &pool(8),
        guard,
        &options,
        id_source(n),
        statement_consumer(),
    )
    .await
    .expect("valid dispatch options")
}

/// Ids bound in the `_batch` list of one execution.
pub fn batch_ids(params: &Params) -> Vec<i64> {
    params["_batch"]
        .as_array()
        .map(|batch| batch.iter().filter_map(|row| row["id"].as_i64()).collect())
        .unwrap_or_default()
}
