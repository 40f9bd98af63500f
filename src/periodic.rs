//! # Periodic Facade
//!
//! Entry points for callers: batched iteration, run-down commits and statement jobs, all
//! against one [`Store`] and one [`ExecutionPool`].

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ConfigManager, IterateConfig, PeriodicConfig};
use crate::constants::BATCH_PARAM;
use crate::error::{PeriodicError, Result};
use crate::execution::{
    iterate_and_execute_batched, prepare_inner_statement, run_down, ExecutionPool,
    StatementConsumer, Store, TerminationGuard,
};
use crate::models::{BatchAndTotalResult, Params, RundownResult};
use crate::scheduler::{job_task, JobInfo, JobScheduler, JobTask, ScheduleAt, ScheduleType};

pub struct Periodic {
    store: Arc<dyn Store>,
    pool: ExecutionPool,
    scheduler: JobScheduler,
    config: PeriodicConfig,
}

impl Periodic {
    /// Engine on the current tokio runtime.
    pub fn new(store: Arc<dyn Store>, config: PeriodicConfig) -> Result<Self> {
        config.validate()?;
        let pool = ExecutionPool::new(&config.pool);
        let scheduler = JobScheduler::new(pool.clone());
        info!(
            worker_threads = pool.worker_threads(),
            "Periodic engine started"
        );
        Ok(Self {
            store,
            pool,
            scheduler,
            config,
        })
    }

    pub fn from_manager(store: Arc<dyn Store>, manager: &ConfigManager) -> Result<Self> {
        Self::new(store, manager.config().clone())
    }

    pub fn config(&self) -> &PeriodicConfig {
        &self.config
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    /// Run `action` for every row of `read`, in batches committed separately.
    ///
    /// Invalid options fail before `read` is executed.
    pub async fn iterate(
        &self,
        read: &str,
        action: &str,
        config: &IterateConfig,
        guard: Arc<dyn TerminationGuard>,
    ) -> Result<BatchAndTotalResult> {
        config.validate()?;
        let mode = config.batch_mode()?;

        let source = self.store.stream(read, &config.params).await?;
        let prepared = prepare_inner_statement(action, mode, source.columns(), BATCH_PARAM)?;
        let options = config.dispatch_options(&self.config, prepared.batched)?;
        let consumer = Arc::new(StatementConsumer::new(
            prepared.statement,
            config.params.clone(),
        ));

        iterate_and_execute_batched(
            Arc::clone(&self.store),
            &self.pool,
            guard,
            &options,
            source,
            consumer,
        )
        .await
    }

    /// Repeat a `LIMIT`-bounded statement until it updates nothing.
    pub async fn commit(
        &self,
        statement: &str,
        params: &Params,
        guard: Arc<dyn TerminationGuard>,
    ) -> Result<RundownResult> {
        run_down(self.store.as_ref(), guard.as_ref(), statement, params).await
    }

    /// Run `statement` once in the background, now or at `at_time`.
    pub fn submit(
        &self,
        name: &str,
        statement: &str,
        params: Params,
        at_time: Option<&ScheduleAt>,
    ) -> Result<JobInfo> {
        let task = self.statement_task("submit", statement, params);
        match at_time {
            Some(at) => self
                .scheduler
                .schedule_at(name, at, task, ScheduleType::Default),
            None => Ok(self.scheduler.submit_job(name, task)),
        }
    }

    /// Run `statement` now and then `rate` after each run completes. A zero `rate` is
    /// rejected.
    pub fn repeat(
        &self,
        name: &str,
        statement: &str,
        rate: Duration,
        params: Params,
    ) -> Result<JobInfo> {
        let task = self.statement_task("repeat", statement, params);
        self.scheduler
            .schedule(name, task, Duration::ZERO, rate, ScheduleType::FixedDelay)
    }

    /// Run `statement` now and every `rate` while the first column of its first row is
    /// a positive count.
    pub fn countdown(&self, name: &str, statement: &str, rate: Duration) -> JobInfo {
        let store = Arc::clone(&self.store);
        let statement: Arc<str> = Arc::from(statement);
        self.scheduler.countdown(
            name,
            move || {
                let store = Arc::clone(&store);
                let statement = Arc::clone(&statement);
                async move {
                    let rows = store
                        .query_transactionally(&statement, &Params::new())
                        .await
                        .map_err(|e| {
                            warn!(error = %e, "in background task via countdown");
                            anyhow::Error::new(e)
                        })?;
                    Ok::<u64, anyhow::Error>(rows
                        .first()
                        .and_then(|row| row.values().next())
                        .and_then(Value::as_u64)
                        .unwrap_or(0))
                }
            },
            rate,
        )
    }

    pub fn list(&self) -> Vec<JobInfo> {
        self.scheduler.list()
    }

    pub fn cancel(&self, name: &str) -> Result<JobInfo> {
        self.scheduler
            .cancel(name)
            .ok_or_else(|| PeriodicError::JobNotFound(name.to_string()))
    }

    fn statement_task(&self, operation: &'static str, statement: &str, params: Params) -> JobTask {
        let store = Arc::clone(&self.store);
        let statement: Arc<str> = Arc::from(statement);
        let params = Arc::new(params);
        job_task(move || {
            let store = Arc::clone(&store);
            let statement = Arc::clone(&statement);
            let params = Arc::clone(&params);
            async move {
                store
                    .execute_transactionally(&statement, &params)
                    .await
                    .map(|_| ())
                    .map_err(|e| {
                        warn!(operation = operation, error = %e, "Background statement failed");
                        anyhow::Error::new(e)
                    })
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::execution::NeverTerminated;
    use crate::test_utils::{rows, MemoryStore};
    use serde_json::json;

    fn engine(store: Arc<MemoryStore>) -> Periodic {
        let config = PeriodicConfig {
            pool: PoolConfig { worker_threads: 4 },
            ..PeriodicConfig::default()
        };
        Periodic::new(store, config).unwrap()
    }

    #[tokio::test]
    async fn iterate_rewrites_and_batches() {
        let store = Arc::new(MemoryStore::new().with_rows(&["id"], rows(100)));
        let periodic = engine(Arc::clone(&store));

        let result = periodic
            .iterate(
                "MATCH (n) RETURN id(n) AS id",
                "CREATE null",
                &IterateConfig::new().with_batch_size(10),
                Arc::new(NeverTerminated),
            )
            .await
            .unwrap();

        assert_eq!(result.batches, 10);
        assert_eq!(result.total, 100);
        assert_eq!(result.committed_operations, 100);
        let executions = store.committed();
        assert_eq!(executions.len(), 10);
        assert_eq!(
            executions[0].statement,
            "UNWIND $_batch AS _batch WITH _batch.id AS id  CREATE null"
        );
    }

    #[tokio::test]
    async fn iterate_rejects_zero_batch_size_before_reading() {
        let store = Arc::new(MemoryStore::new().with_rows(&["id"], rows(5)));
        let periodic = engine(Arc::clone(&store));

        let result = periodic
            .iterate(
                "RETURN 1",
                "CREATE null",
                &IterateConfig::new().with_batch_size(0),
                Arc::new(NeverTerminated),
            )
            .await;

        assert!(matches!(result, Err(PeriodicError::ConfigurationError(_))));
        assert!(store.executions().is_empty());
    }

    #[tokio::test]
    async fn submitted_statement_runs_in_the_background() {
        let store = Arc::new(MemoryStore::new());
        let periodic = engine(Arc::clone(&store));

        let info = periodic
            .submit("create", "CREATE (:Job)", json!({"x": 1}).as_object().cloned().unwrap(), None)
            .unwrap();
        assert_eq!(info.name, "create");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let committed = store.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].params["x"], json!(1));
        assert!(periodic.list()[0].done);
    }

    #[tokio::test]
    async fn cancelling_an_unknown_job_is_an_error() {
        let periodic = engine(Arc::new(MemoryStore::new()));
        assert_eq!(
            periodic.cancel("missing").unwrap_err(),
            PeriodicError::JobNotFound("missing".to_string())
        );
    }
}
