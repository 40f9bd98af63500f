#![allow(clippy::doc_markdown)] // Allow technical terms like BATCH_SINGLE, UNWIND in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Periodic Core Rust
//!
//! Batched execution of a data-transformation statement over an unbounded row stream, and
//! a named background job scheduler sharing the same execution substrate.
//!
//! ## Overview
//!
//! A caller hands over a read statement, an action statement and a handful of options.
//! The rows produced by the read statement are pulled in fixed-size batches; every batch
//! is applied in its own transaction on a bounded worker pool, retried on failure, and
//! accounted for in a [`BatchAndTotalResult`]. Failures never abort the dispatch: they
//! are tallied per error message, separately for whole batches and for single operations.
//!
//! ## Architecture
//!
//! ```text
//! RowSource ──▶ Statement Adapter ──▶ Batch Dispatcher ──▶ Result Collector ──▶ summary
//!                                          │
//!                                   ExecutionPool ◀── JobScheduler (named jobs)
//! ```
//!
//! ## Module Organization
//!
//! - [`execution`] - Statement adapter, worker pool, batch dispatcher and collector
//! - [`scheduler`] - Named one-shot and repeating background jobs
//! - [`periodic`] - Facade tying a store, the pool and the scheduler together
//! - [`config`] - Engine configuration and per-call iteration options
//! - [`models`] - Rows, statistics and result summaries
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup and helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use periodic_core::config::{ConfigManager, IterateConfig};
//! use periodic_core::execution::TerminationFlag;
//! use periodic_core::test_utils::{rows, MemoryStore};
//! use periodic_core::Periodic;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let store = Arc::new(MemoryStore::new().with_rows(&["id"], rows(1_000)));
//! let periodic = Periodic::from_manager(store, &manager)?;
//!
//! let result = periodic
//!     .iterate(
//!         "MATCH (n:Person) RETURN n.id AS id",
//!         "MATCH (n:Person {id: id}) SET n.seen = true",
//!         &IterateConfig::new().with_batch_size(100).with_parallel(true, Some(4)),
//!         Arc::new(TerminationFlag::new()),
//!     )
//!     .await?;
//! println!("{} rows in {} batches", result.total, result.batches);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod execution;
pub mod logging;
pub mod models;
pub mod periodic;
pub mod scheduler;
pub mod test_utils;

pub use config::{ConfigManager, IterateConfig, PeriodicConfig};
pub use error::{PeriodicError, Result, StoreError};
pub use execution::{
    BatchMode, ExecutionPool, RowSource, Store, TerminationFlag, TerminationGuard, Transaction,
};
pub use models::{BatchAndTotalResult, Params, QueryStatistics, Row, RundownResult};
pub use periodic::Periodic;
pub use scheduler::{JobInfo, JobScheduler, ScheduleAt, ScheduleType};
