//! # Batch Execution
//!
//! Everything between a row stream and its committed batches: the statement rewrite,
//! the worker pool, the per-batch transaction runner, the dispatcher that feeds it and
//! the collector that accounts for the outcome.

pub mod adapter;
pub mod batch;
pub mod collector;
pub mod dispatcher;
pub mod pool;
pub mod rundown;
pub mod source;
pub mod store;
pub mod termination;

pub use adapter::{prepare_inner_statement, BatchMode, PreparedStatement};
pub use batch::{BatchConsumer, BatchRows, BatchRunner, ExecuteBatch, RetryPolicy, StatementConsumer};
pub use collector::BatchAndTotalCollector;
pub use dispatcher::{iterate_and_execute_batched, DispatchOptions};
pub use pool::{CancelSignal, ExecutionPool, JobHandle, ScheduledRun, TaskHandle};
pub use rundown::{require_limit, run_down};
pub use source::{IteratorSource, RowSource};
pub use store::{Store, Transaction};
pub use termination::{NeverTerminated, TerminationFlag, TerminationGuard};
