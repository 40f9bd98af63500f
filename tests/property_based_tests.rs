//! Property-based tests for statement rewriting, retry backoff and batch accounting.

mod common;

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use common::{action_strategy, batch_ids, batching_strategy, columns_strategy, dispatch};
use periodic_core::constants::BATCH_PARAM;
use periodic_core::execution::{prepare_inner_statement, BatchMode, DispatchOptions, RetryPolicy};
use periodic_core::test_utils::MemoryStore;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rewriting_is_idempotent(
        columns in columns_strategy(),
        action in action_strategy(),
        mode in prop_oneof![Just(BatchMode::Single), Just(BatchMode::Batch), Just(BatchMode::BatchSingle)],
    ) {
        let once = prepare_inner_statement(&action, mode, &columns, BATCH_PARAM).unwrap();
        let twice = prepare_inner_statement(&once.statement, mode, &columns, BATCH_PARAM).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn batch_rewrite_unwinds_the_batch_parameter(
        columns in columns_strategy(),
        action in action_strategy(),
    ) {
        let prepared = prepare_inner_statement(&action, BatchMode::Batch, &columns, BATCH_PARAM).unwrap();
        prop_assert!(prepared.batched);
        prop_assert!(prepared.statement.starts_with("UNWIND $_batch AS _batch"));
        prop_assert!(prepared.statement.ends_with(&action));
    }

    #[test]
    fn retry_delay_grows_and_stays_capped(
        backoff_ms in 1u64..500,
        cap_ms in 500u64..10_000,
        attempt in 1u64..64,
    ) {
        let policy = RetryPolicy::new(64)
            .with_backoff(Duration::from_millis(backoff_ms), Duration::from_millis(cap_ms));
        let delay = policy.delay(attempt);
        prop_assert!(delay >= policy.delay(attempt.saturating_sub(1).max(1)));
        prop_assert!(delay <= Duration::from_millis(cap_ms));
        prop_assert!(delay >= Duration::from_millis(backoff_ms));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_row_lands_in_exactly_one_batch((rows, batch_size) in batching_strategy()) {
        let store = Arc::new(MemoryStore::new());
        let result = tokio_test::block_on(dispatch(&store, DispatchOptions::new(batch_size, 1), rows));

        let expected_batches = (rows as u64).div_ceil(batch_size as u64);
        prop_assert_eq!(result.batches, expected_batches);
        prop_assert_eq!(result.total, rows as u64);
        prop_assert!(result.is_fully_accounted());

        let committed = store.committed();
        prop_assert!(committed.iter().all(|e| batch_ids(&e.params).len() <= batch_size));
        let ids: Vec<i64> = committed.iter().flat_map(|e| batch_ids(&e.params)).collect();
        prop_assert_eq!(ids, (0..rows).collect::<Vec<i64>>());
    }
}
