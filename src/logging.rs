//! # Structured Logging Module
//!
//! Environment-aware structured logging for batch dispatch and background jobs. Console
//! output is human readable by default and JSON when `PERIODIC_LOG_FORMAT=json`.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    let environment = get_environment();
    let format = std::env::var("PERIODIC_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    init_logging(&LoggingConfig {
        level: get_log_level(&environment).to_string(),
        format,
    });
}

/// Initialize structured logging from loaded configuration. Only the first call in a
/// process installs a subscriber.
pub fn init_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = || {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
        };
        let json = config.format.eq_ignore_ascii_case("json");

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter())
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter())
                .boxed()
        };

        // A subscriber installed by the host application wins.
        if tracing_subscriber::registry().with(console).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %get_environment(),
            level = %config.level,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
pub(crate) fn get_environment() -> String {
    std::env::var("PERIODIC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log one warning per distinct error message with its occurrence count.
pub fn log_errors(prefix: &str, errors: &BTreeMap<String, u64>) {
    for (message, count) in errors {
        tracing::warn!(
            occurrences = count,
            error = %message,
            "{prefix}"
        );
    }
}

/// Log structured data for batch operations
pub fn log_batch_operation(
    operation: &str,
    run_id: &str,
    batch: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = %run_id,
        batch = batch,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📦 BATCH_OPERATION"
    );
}

/// Log structured data for job operations
pub fn log_job_operation(operation: &str, job: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        job = %job,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "⏰ JOB_OPERATION"
    );
}
