//! # Job Scheduler
//!
//! Named background jobs on the scheduler substrate of an [`ExecutionPool`].
//!
//! ```text
//! SCHEDULED ──▶ RUNNING ──▶ SCHEDULED   repeating, not cancelled
//!                      └──▶ DONE        one-shot, or a run failed
//! SCHEDULED ──▶ CANCELLED               cancel before or between runs
//! ```
//!
//! A run in progress is never interrupted; cancelling only prevents the next one.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::job::{JobInfo, ScheduleType};
use super::registry::JobRegistry;
use super::schedule_time::{delay_from_now, ScheduleAt};
use super::task::{wrap_task, JobTask};
use crate::constants::ONE_DAY;
use crate::error::{PeriodicError, Result};
use crate::execution::{ExecutionPool, JobHandle};
use crate::logging::log_job_operation;

/// One step of a countdown job. Returns how much work is left.
pub type CountdownStep = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<u64>> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobScheduler {
    pool: ExecutionPool,
    registry: Arc<JobRegistry>,
}

impl JobScheduler {
    pub fn new(pool: ExecutionPool) -> Self {
        Self::with_registry(pool, Arc::new(JobRegistry::new()))
    }

    pub fn with_registry(pool: ExecutionPool, registry: Arc<JobRegistry>) -> Self {
        Self { pool, registry }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Run `task` once, as soon as possible, replacing any unfinished job of that name.
    pub fn submit_job(&self, name: &str, task: JobTask) -> JobInfo {
        let info = JobInfo::new(name);
        let run = wrap_task(name, task);
        let handle = self
            .registry
            .replace(info.clone(), || self.pool.schedule_once(run, Duration::ZERO));
        log_job_operation("submit", name, "scheduled", None);
        info.with_state(&handle)
    }

    /// Run `task` after `delay`, then every `repeat` for repeating schedule types.
    /// Repeating types reject a zero `repeat` before anything is registered.
    pub fn schedule(
        &self,
        name: &str,
        task: JobTask,
        delay: Duration,
        repeat: Duration,
        schedule_type: ScheduleType,
    ) -> Result<JobInfo> {
        let rate = if schedule_type.is_repeating() {
            if repeat.is_zero() {
                return Err(PeriodicError::InvalidSchedule(format!(
                    "{schedule_type:?} job `{name}` needs a repeat interval greater than zero"
                )));
            }
            repeat
        } else {
            Duration::ZERO
        };
        let info = JobInfo::scheduled(name, delay, rate);
        let run = wrap_task(name, task);
        let handle = self.registry.replace(info.clone(), || match schedule_type {
            ScheduleType::Default => self.pool.schedule_once(run, delay),
            ScheduleType::FixedDelay => self.pool.schedule_fixed_delay(run, delay, repeat),
            ScheduleType::FixedRate => self.pool.schedule_fixed_rate(run, delay, repeat),
        });
        log_job_operation(
            "schedule",
            name,
            "scheduled",
            Some(&format!(
                "type={schedule_type:?} delay={}s rate={}s",
                delay.as_secs(),
                rate.as_secs()
            )),
        );
        Ok(info.with_state(&handle))
    }

    /// Schedule `task` at a point in time, repeating daily for repeating schedule types.
    /// A point in the past fails before anything is registered.
    pub fn schedule_at(
        &self,
        name: &str,
        at: &ScheduleAt,
        task: JobTask,
        schedule_type: ScheduleType,
    ) -> Result<JobInfo> {
        let delay = delay_from_now(at)?;
        self.schedule(name, task, delay, ONE_DAY, schedule_type)
    }

    /// Run `step` now and again every `rate` while it reports work left. Each follow-up
    /// run is a fresh one-shot job under the same name, so `cancel(name)` ends the chain.
    pub fn countdown<F, Fut>(&self, name: &str, step: F, rate: Duration) -> JobInfo
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<u64>> + Send + 'static,
    {
        let step: CountdownStep = Arc::new(move || step().boxed());
        self.submit_job(name, self.countdown_task(name, step, rate))
    }

    fn countdown_task(&self, name: &str, step: CountdownStep, rate: Duration) -> JobTask {
        let scheduler = self.clone();
        let name: Arc<str> = Arc::from(name);
        Arc::new(move || {
            let scheduler = scheduler.clone();
            let name = Arc::clone(&name);
            let step = Arc::clone(&step);
            async move {
                let remaining = step().await?;
                if remaining > 0 {
                    let next = scheduler.countdown_task(&name, step, rate);
                    scheduler.schedule(&name, next, rate, Duration::ZERO, ScheduleType::Default)?;
                } else {
                    log_job_operation("countdown", &name, "finished", None);
                }
                Ok::<(), anyhow::Error>(())
            }
            .boxed()
        })
    }

    /// Remove a job and stop it from running again. `None` when no job has that name.
    pub fn cancel(&self, name: &str) -> Option<JobInfo> {
        let (info, handle) = self.registry.remove(name)?;
        if !handle.is_done() {
            handle.cancel();
        }
        log_job_operation("cancel", name, "cancelled", None);
        Some(JobInfo {
            cancelled: handle.is_cancelled(),
            ..info
        })
    }

    pub fn list(&self) -> Vec<JobInfo> {
        self.registry.list()
    }

    pub fn handle(&self, name: &str) -> Option<JobHandle> {
        self.registry.handle(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::scheduler::task::job_task;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    fn scheduler() -> JobScheduler {
        JobScheduler::new(ExecutionPool::new(&PoolConfig { worker_threads: 2 }))
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> JobTask {
        job_task(move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
    }

    #[tokio::test]
    async fn resubmitting_a_name_replaces_the_pending_job() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            "sync",
            counting_task(Arc::clone(&counter)),
            Duration::from_secs(60),
            Duration::ZERO,
            ScheduleType::Default,
        )
        .unwrap();
        let first = scheduler.handle("sync").unwrap();
        scheduler.submit_job("sync", counting_task(Arc::clone(&counter)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(first.is_cancelled());
        let jobs = scheduler.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].delay, Duration::ZERO);
        assert!(jobs[0].done);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_shot_schedule_reports_no_rate() {
        let info = scheduler().schedule(
            "later",
            counting_task(Arc::new(AtomicUsize::new(0))),
            Duration::from_secs(5),
            Duration::from_secs(10),
            ScheduleType::Default,
        )
        .unwrap();
        assert_eq!(info.delay, Duration::from_secs(5));
        assert_eq!(info.rate, Duration::ZERO);
    }

    #[tokio::test]
    async fn cancel_removes_and_stops_a_repeating_job() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.schedule(
            "tick",
            counting_task(Arc::clone(&counter)),
            Duration::ZERO,
            Duration::from_millis(10),
            ScheduleType::FixedDelay,
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        let info = scheduler.cancel("tick").unwrap();
        assert!(info.cancelled);
        assert!(scheduler.list().is_empty());
        assert!(scheduler.cancel("tick").is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        let runs = counter.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), runs);
    }

    #[tokio::test]
    async fn failing_repeating_job_stops() {
        let scheduler = scheduler();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        scheduler.schedule(
            "broken",
            job_task(move || {
                let counted = Arc::clone(&counted);
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(anyhow::anyhow!("statement failed"))
                }
            }),
            Duration::ZERO,
            Duration::from_millis(10),
            ScheduleType::FixedRate,
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        let jobs = scheduler.list();
        assert!(jobs[0].done);
        assert!(!jobs[0].cancelled);
    }

    #[tokio::test]
    async fn repeating_schedule_rejects_a_zero_interval() {
        let scheduler = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));

        for schedule_type in [ScheduleType::FixedDelay, ScheduleType::FixedRate] {
            let result = scheduler.schedule(
                "hot",
                counting_task(Arc::clone(&counter)),
                Duration::ZERO,
                Duration::ZERO,
                schedule_type,
            );
            assert!(matches!(result, Err(PeriodicError::InvalidSchedule(_))));
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scheduler.list().is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn past_schedule_registers_nothing() {
        let scheduler = scheduler();
        let at = ScheduleAt::DateTime(
            chrono::NaiveDate::from_ymd_opt(2000, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        );
        let result = scheduler.schedule_at(
            "past",
            &at,
            counting_task(Arc::new(AtomicUsize::new(0))),
            ScheduleType::Default,
        );

        assert!(result.is_err());
        assert!(scheduler.list().is_empty());
    }

    #[tokio::test]
    async fn countdown_runs_until_nothing_is_left() {
        let scheduler = scheduler();
        let remaining = Arc::new(AtomicU64::new(3));
        let left = Arc::clone(&remaining);

        scheduler.countdown(
            "drain",
            move || {
                let left = Arc::clone(&left);
                async move { Ok::<u64, anyhow::Error>(left.fetch_sub(1, Ordering::SeqCst) - 1) }
            },
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.list().len(), 1);
    }
}
