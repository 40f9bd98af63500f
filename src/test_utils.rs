//! # Test Utilities
//!
//! In-memory [`Store`] with programmable responses, plus row builders shared by the unit
//! and integration tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::execution::source::{IteratorSource, RowSource};
use crate::execution::store::{Store, Transaction};
use crate::models::{Params, QueryStatistics, Row};

type ExecuteResponder =
    Arc<dyn Fn(&str, &Params) -> Result<QueryStatistics, StoreError> + Send + Sync>;
type QueryResponder = Arc<dyn Fn(&str, &Params) -> Result<Vec<Row>, StoreError> + Send + Sync>;

/// One statement execution seen by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub statement: String,
    pub params: Params,
}

#[derive(Debug, Default)]
struct Journal {
    executions: Vec<Execution>,
    committed: Vec<Execution>,
    commits: u64,
    rollbacks: u64,
    open: usize,
    peak_open: usize,
}

/// Store double. Every execution is journalled; executions of committed transactions are
/// kept separately so tests can tell attempts from applied work.
///
/// Without a responder, `execute` applies one operation per row of the bound `_batch`
/// list (one when nothing is bound) and `query` returns no rows.
#[derive(Clone, Default)]
pub struct MemoryStore {
    columns: Vec<String>,
    rows: Vec<Row>,
    latency: Duration,
    on_execute: Option<ExecuteResponder>,
    on_query: Option<QueryResponder>,
    commit_failure: Option<String>,
    journal: Arc<Mutex<Journal>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned by [`Store::stream`] for any read statement.
    pub fn with_rows(mut self, columns: &[&str], rows: Vec<Row>) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.rows = rows;
        self
    }

    /// Time every `execute` takes before responding.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &Params) -> Result<QueryStatistics, StoreError> + Send + Sync + 'static,
    {
        self.on_execute = Some(Arc::new(responder));
        self
    }

    pub fn respond_to_query<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str, &Params) -> Result<Vec<Row>, StoreError> + Send + Sync + 'static,
    {
        self.on_query = Some(Arc::new(responder));
        self
    }

    /// Fail `execute` with the returned message whenever `predicate` yields one.
    pub fn fail_when<F>(self, predicate: F) -> Self
    where
        F: Fn(&str, &Params) -> Option<String> + Send + Sync + 'static,
    {
        self.respond_with(move |statement, params| match predicate(statement, params) {
            Some(message) => Err(StoreError::new(message)),
            None => Ok(default_statistics(params)),
        })
    }

    /// Fail every commit with `message`. Work of a failed commit is never applied.
    pub fn fail_commits(mut self, message: &str) -> Self {
        self.commit_failure = Some(message.to_string());
        self
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.journal.lock().executions.clone()
    }

    pub fn committed(&self) -> Vec<Execution> {
        self.journal.lock().committed.clone()
    }

    pub fn commits(&self) -> u64 {
        self.journal.lock().commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.journal.lock().rollbacks
    }

    /// Most transactions ever open at the same time.
    pub fn peak_open_transactions(&self) -> usize {
        self.journal.lock().peak_open
    }
}

fn default_statistics(params: &Params) -> QueryStatistics {
    let applied = params
        .get(crate::constants::BATCH_PARAM)
        .and_then(Value::as_array)
        .map_or(1, |batch| batch.len() as u64);
    QueryStatistics::applied(applied)
}

struct MemoryTransaction {
    latency: Duration,
    on_execute: Option<ExecuteResponder>,
    on_query: Option<QueryResponder>,
    commit_failure: Option<String>,
    journal: Arc<Mutex<Journal>>,
    pending: Vec<Execution>,
}

impl MemoryTransaction {
    fn record(&mut self, statement: &str, params: &Params) {
        let execution = Execution {
            statement: statement.to_string(),
            params: params.clone(),
        };
        self.journal.lock().executions.push(execution.clone());
        self.pending.push(execution);
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn execute(
        &mut self,
        statement: &str,
        params: &Params,
    ) -> Result<QueryStatistics, StoreError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.record(statement, params);
        match &self.on_execute {
            Some(responder) => responder(statement, params),
            None => Ok(default_statistics(params)),
        }
    }

    async fn query(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>, StoreError> {
        self.record(statement, params);
        match &self.on_query {
            Some(responder) => responder(statement, params),
            None => Ok(Vec::new()),
        }
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let committed = std::mem::take(&mut self.pending);
        let mut journal = self.journal.lock();
        journal.open = journal.open.saturating_sub(1);
        if let Some(message) = &self.commit_failure {
            return Err(StoreError::new(message.clone()));
        }
        journal.commits += 1;
        journal.committed.extend(committed);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut journal = self.journal.lock();
        journal.open = journal.open.saturating_sub(1);
        journal.rollbacks += 1;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        {
            let mut journal = self.journal.lock();
            journal.open += 1;
            journal.peak_open = journal.peak_open.max(journal.open);
        }
        Ok(Box::new(MemoryTransaction {
            latency: self.latency,
            on_execute: self.on_execute.clone(),
            on_query: self.on_query.clone(),
            commit_failure: self.commit_failure.clone(),
            journal: Arc::clone(&self.journal),
            pending: Vec::new(),
        }))
    }

    async fn stream(
        &self,
        _statement: &str,
        _params: &Params,
    ) -> Result<Box<dyn RowSource>, StoreError> {
        Ok(Box::new(IteratorSource::new(
            self.columns.clone(),
            self.rows.clone().into_iter(),
        )))
    }
}

/// Single-column rows `{id: 0} .. {id: n-1}`.
pub fn rows(n: i64) -> Vec<Row> {
    (0..n).map(|id| row("id", Value::from(id))).collect()
}

pub fn row(field: &str, value: Value) -> Row {
    let mut row = Row::new();
    row.insert(field.to_string(), value);
    row
}

/// Select the test environment unless the caller already chose one.
pub fn setup_test_environment() {
    if env::var("PERIODIC_ENV").is_err() {
        env::set_var("PERIODIC_ENV", "test");
    }
}
