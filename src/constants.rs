//! # Constants
//!
//! Reserved parameter names bound into batch executions and fixed values shared by the
//! dispatcher and the scheduler.

use std::time::Duration;

/// Parameter carrying the batch list, and the iterator variable of the list-unwind rewrite.
pub const BATCH_PARAM: &str = "_batch";

/// Parameter carrying the number of rows accepted before the current batch or row.
pub const COUNT_PARAM: &str = "_count";

/// Parameter carrying the zero-based transaction attempt number.
pub const RETRY_PARAM: &str = "_retry";

/// Parameter carrying the running total of a run-down commit.
pub const TOTAL_PARAM: &str = "_total";

pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Repeat interval used when a job is scheduled at a wall-clock time.
pub const ONE_DAY: Duration = Duration::from_secs(SECONDS_PER_DAY);

pub const ERROR_DATE_BEFORE: &str = "The provided date is before current date";

pub mod defaults {
    use std::time::Duration;

    pub const BATCH_SIZE: i64 = 10_000;
    pub const RETRIES: i64 = 0;
    pub const FAILED_PARAMS: i64 = -1;
    pub const POLL_INTERVAL: Duration = Duration::from_millis(1);
    pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);
    pub const RETRY_BACKOFF_MAX: Duration = Duration::from_secs(5);
}
