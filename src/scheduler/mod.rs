//! # Job Scheduling
//!
//! Named, cancellable background jobs: run once now, once at a later time, or repeatedly
//! at a fixed delay or rate. Jobs live in memory only.

pub mod job;
pub mod registry;
pub mod schedule_time;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod task;

pub use job::{JobInfo, ScheduleType};
pub use registry::JobRegistry;
pub use schedule_time::{delay_from_now, delay_until, ScheduleAt};
pub use scheduler::{CountdownStep, JobScheduler};
pub use task::{job_task, wrap_task, JobTask};
