use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store-specific update counters (`nodesCreated`, `propertiesSet`, ...), summed across
/// transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateStatistics(BTreeMap<String, i64>);

impl UpdateStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, counter: impl Into<String>, value: i64) -> Self {
        self.add(counter, value);
        self
    }

    pub fn add(&mut self, counter: impl Into<String>, value: i64) {
        *self.0.entry(counter.into()).or_insert(0) += value;
    }

    pub fn merge(&mut self, other: &UpdateStatistics) {
        for (counter, value) in &other.0 {
            self.add(counter.clone(), *value);
        }
    }

    pub fn get(&self, counter: &str) -> i64 {
        self.0.get(counter).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i64)> {
        self.0.iter()
    }
}

/// What one statement execution inside a transaction reported.
///
/// `failed` and `errors` describe operations that failed while the transaction as a
/// whole still committed. A statement that cannot run at all is reported as an `Err`
/// by the store instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    /// Operations applied
    pub applied: u64,
    /// Operations that failed inside the committed transaction
    pub failed: u64,
    /// Failure message to occurrence count for `failed`
    pub errors: BTreeMap<String, u64>,
    /// Store update counters
    pub updates: UpdateStatistics,
}

impl QueryStatistics {
    pub fn applied(applied: u64) -> Self {
        Self {
            applied,
            ..Self::default()
        }
    }

    /// Record `count` failed operations under `message`.
    pub fn with_failures(mut self, message: impl Into<String>, count: u64) -> Self {
        self.failed += count;
        *self.errors.entry(message.into()).or_insert(0) += count;
        self
    }

    pub fn with_updates(mut self, updates: UpdateStatistics) -> Self {
        self.updates.merge(&updates);
        self
    }

    /// Fold another execution's statistics into this one.
    pub fn merge(&mut self, other: QueryStatistics) {
        self.applied += other.applied;
        self.failed += other.failed;
        for (message, count) in other.errors {
            *self.errors.entry(message).or_insert(0) += count;
        }
        self.updates.merge(&other.updates);
    }
}
