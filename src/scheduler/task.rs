use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::error::PeriodicError;
use crate::execution::pool::panic_message;
use crate::execution::ScheduledRun;

/// Body of a background job. Called once per run.
pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Build a [`JobTask`] from an async closure.
pub fn job_task<F, Fut>(task: F) -> JobTask
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move || task().boxed())
}

/// Wrap `task` so every run is logged and any failure, panics included, is logged and
/// reported to the scheduler as an error. A repeating job stops at its first failure.
pub fn wrap_task(name: &str, task: JobTask) -> ScheduledRun {
    let name: Arc<str> = Arc::from(name);
    Arc::new(move || {
        let name = Arc::clone(&name);
        let task = Arc::clone(&task);
        async move {
            debug!(job = %name, "Executing task");
            match AssertUnwindSafe(async { task().await }).catch_unwind().await {
                Ok(Ok(())) => {
                    debug!(job = %name, "Executed task");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(job = %name, error = %format!("{e:#}"), "Error while executing task, the task will be killed");
                    Err(PeriodicError::TaskFailed(e.to_string()))
                }
                Err(payload) => {
                    let message = panic_message(payload);
                    error!(job = %name, error = %message, "Task panicked, the task will be killed");
                    Err(PeriodicError::TaskFailed(message))
                }
            }
        }
        .boxed()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_task_passes_through() {
        let run = wrap_task("ok", job_task(|| async { Ok::<(), anyhow::Error>(()) }));
        assert!(run().await.is_ok());
    }

    #[tokio::test]
    async fn failure_is_reported_to_the_scheduler() {
        let run = wrap_task("broken", job_task(|| async { Err::<(), _>(anyhow::anyhow!("no such label")) }));
        assert_eq!(
            run().await.unwrap_err(),
            PeriodicError::TaskFailed("no such label".to_string())
        );
    }

    #[tokio::test]
    async fn panic_is_caught() {
        let task: JobTask = Arc::new(|| -> BoxFuture<'static, anyhow::Result<()>> {
            panic!("task exploded")
        });
        let run = wrap_task("panicky", task);
        assert_eq!(
            run().await.unwrap_err(),
            PeriodicError::TaskFailed("task exploded".to_string())
        );
    }
}
