use thiserror::Error;

/// Failure reported by a backing store.
///
/// The message is the identity of the failure: error tables in the batch summary are keyed
/// by it, so two failures with the same text are tallied together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for StoreError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PeriodicError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Unrecognised batch mode: [{0}]")]
    InvalidBatchMode(String),
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Task failed: {0}")]
    TaskFailed(String),
    #[error("Job not found: {0}")]
    JobNotFound(String),
}

pub type Result<T> = std::result::Result<T, PeriodicError>;
