//! Per-call options of a batched iteration.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::defaults;
use crate::error::{PeriodicError, Result};
use crate::execution::{BatchMode, DispatchOptions, RetryPolicy};
use crate::models::Params;

use super::PeriodicConfig;

/// Options map of one `iterate` call, keyed in camelCase.
///
/// Absent `batchSize` and `concurrency` fall back to the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IterateConfig {
    pub batch_size: Option<i64>,
    pub parallel: bool,
    pub concurrency: Option<i64>,
    pub retries: i64,
    pub batch_mode: Option<String>,
    /// Legacy switch: `false` selects `SINGLE`, `true` selects `BATCH`
    pub iterate_list: Option<bool>,
    pub params: Params,
    /// Rows of each failed batch to report; negative disables
    pub failed_params: i64,
}

impl IterateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an options map as sent by a caller.
    pub fn from_map(options: &Params) -> Result<Self> {
        let config: IterateConfig = serde_json::from_value(Value::Object(options.clone()))
            .map_err(|e| PeriodicError::ConfigurationError(e.to_string()))?;
        Ok(config)
    }

    pub fn batch_size_or(&self, default: usize) -> i64 {
        self.batch_size.unwrap_or(default as i64)
    }

    /// `batchMode` wins over the legacy `iterateList` flag.
    pub fn batch_mode(&self) -> Result<BatchMode> {
        match (&self.batch_mode, self.iterate_list) {
            (Some(mode), _) => mode.parse(),
            (None, Some(iterate_list)) => Ok(BatchMode::from_iterate_list(iterate_list)),
            (None, None) => Ok(BatchMode::default()),
        }
    }

    /// Reject values that could never make progress, before any work starts.
    pub fn validate(&self) -> Result<()> {
        if let Some(batch_size) = self.batch_size {
            if batch_size < 1 {
                return Err(PeriodicError::ConfigurationError(
                    "batchSize parameter must be greater than zero".to_string(),
                ));
            }
        }
        if let Some(concurrency) = self.concurrency {
            if concurrency < 1 {
                return Err(PeriodicError::ConfigurationError(
                    "concurrency parameter must be greater than zero".to_string(),
                ));
            }
        }
        if self.retries < 0 {
            return Err(PeriodicError::ConfigurationError(
                "retries parameter must not be negative".to_string(),
            ));
        }
        self.batch_mode()
            .map_err(|e| PeriodicError::ConfigurationError(e.to_string()))?;
        Ok(())
    }

    /// Dispatch options for this call under the engine configuration. `iterate_list` is
    /// decided by the statement rewrite and passed in.
    pub fn dispatch_options(
        &self,
        engine: &PeriodicConfig,
        iterate_list: bool,
    ) -> Result<DispatchOptions> {
        self.validate()?;
        let dispatch = &engine.dispatch;
        let batch_size = self.batch_size_or(dispatch.default_batch_size) as usize;
        let concurrency = self
            .concurrency
            .map_or(engine.pool.worker_threads, |c| c as usize);
        let failed_params = usize::try_from(self.failed_params).ok();

        Ok(DispatchOptions::new(batch_size, concurrency)
            .parallel(self.parallel)
            .iterate_list(iterate_list)
            .retry_policy(
                RetryPolicy::new(self.retries as u64)
                    .with_backoff(dispatch.retry_backoff(), dispatch.retry_backoff_max()),
            )
            .failed_params(failed_params)
            .poll_interval(dispatch.poll_interval()))
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_parallel(mut self, parallel: bool, concurrency: Option<i64>) -> Self {
        self.parallel = parallel;
        self.concurrency = concurrency;
        self
    }

    pub fn with_retries(mut self, retries: i64) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = Some(mode.as_str().to_string());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_failed_params(mut self, failed_params: i64) -> Self {
        self.failed_params = failed_params;
        self
    }
}

impl Default for IterateConfig {
    fn default() -> Self {
        Self {
            batch_size: None,
            parallel: false,
            concurrency: None,
            retries: defaults::RETRIES,
            batch_mode: None,
            iterate_list: None,
            params: Params::new(),
            failed_params: defaults::FAILED_PARAMS,
        }
    }
}
