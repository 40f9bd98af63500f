//! # Periodic Configuration System
//!
//! Engine-level settings ([`PeriodicConfig`]) are loaded once by [`ConfigManager`] from
//! built-in defaults, optional `config/periodic.*` files with per-environment overrides,
//! and `PERIODIC__`-prefixed environment variables. Per-call settings of a batched
//! iteration ([`IterateConfig`]) arrive as a JSON map with camelCase keys.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use periodic_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().pool.worker_threads;
//! let poll = manager.config().dispatch.poll_interval();
//! # Ok(())
//! # }
//! ```

pub mod iterate;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::error::{PeriodicError, Result};

pub use iterate::IterateConfig;
pub use loader::ConfigManager;

/// Root configuration structure mirroring periodic.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PeriodicConfig {
    /// Worker pool sizing
    pub pool: PoolConfig,

    /// Batch dispatch tuning
    pub dispatch: DispatchConfig,

    /// Log level and output format
    pub logging: LoggingConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum units running at once on the parallel pool. Also the default `concurrency`
    /// of a parallel iteration.
    pub worker_threads: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let processors = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            worker_threads: processors * 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Batch size used when a call does not name one
    pub default_batch_size: usize,
    /// Pause of the pull loop while at capacity
    pub poll_interval_micros: u64,
    /// First retry pause; doubles per attempt
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_batch_size: defaults::BATCH_SIZE as usize,
            poll_interval_micros: defaults::POLL_INTERVAL.as_micros() as u64,
            retry_backoff_ms: defaults::RETRY_BACKOFF.as_millis() as u64,
            retry_backoff_max_ms: defaults::RETRY_BACKOFF_MAX.as_millis() as u64,
        }
    }
}

impl DispatchConfig {
    /// Get capacity poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_micros)
    }

    /// Get first retry pause as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Get retry pause cap as Duration
    pub fn retry_backoff_max(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_max_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl PeriodicConfig {
    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.pool.worker_threads == 0 {
            return Err(PeriodicError::ConfigurationError(
                "pool.worker_threads must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.default_batch_size == 0 {
            return Err(PeriodicError::ConfigurationError(
                "dispatch.default_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.dispatch.retry_backoff_max_ms < self.dispatch.retry_backoff_ms {
            return Err(PeriodicError::ConfigurationError(
                "dispatch.retry_backoff_max_ms must not be below dispatch.retry_backoff_ms"
                    .to_string(),
            ));
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(PeriodicError::ConfigurationError(format!(
                "logging.format must be `pretty` or `json`, got `{}`",
                self.logging.format
            )));
        }

        Ok(())
    }
}
