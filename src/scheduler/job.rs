use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::execution::JobHandle;

/// When a scheduled job runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    /// Once, after the delay
    #[default]
    Default,
    /// Next run starts `rate` after the previous one completed
    FixedDelay,
    /// Next run starts `rate` after the previous one started
    FixedRate,
}

impl ScheduleType {
    pub fn is_repeating(&self) -> bool {
        !matches!(self, ScheduleType::Default)
    }
}

/// Registered job as seen by callers. Names are unique within a scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    /// Delay before the first run, in whole seconds when serialized
    #[serde(with = "duration_secs")]
    pub delay: Duration,
    /// Repeat interval, zero for one-shot jobs
    #[serde(with = "duration_secs")]
    pub rate: Duration,
    pub done: bool,
    pub cancelled: bool,
}

impl JobInfo {
    /// Job that runs once, as soon as a worker is free.
    pub fn new(name: impl Into<String>) -> Self {
        Self::scheduled(name, Duration::ZERO, Duration::ZERO)
    }

    pub fn scheduled(name: impl Into<String>, delay: Duration, rate: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            rate,
            done: false,
            cancelled: false,
        }
    }

    /// Copy with the current state of `handle`.
    pub fn with_state(mut self, handle: &JobHandle) -> Self {
        self.done = handle.is_done();
        self.cancelled = handle.is_cancelled();
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
