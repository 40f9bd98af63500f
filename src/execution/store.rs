//! # Store Contract
//!
//! The transactional store the dispatcher runs statements against. Implementations must
//! roll a transaction back completely when it is not committed: a batch is either applied
//! in full or not at all.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::execution::source::RowSource;
use crate::models::{Params, QueryStatistics, Row};

/// An open transaction.
#[async_trait]
pub trait Transaction: Send {
    /// Run a mutating statement. `Err` means the statement failed and the transaction
    /// cannot commit.
    async fn execute(
        &mut self,
        statement: &str,
        params: &Params,
    ) -> Result<QueryStatistics, StoreError>;

    /// Run a statement and collect the rows it returns.
    async fn query(&mut self, statement: &str, params: &Params) -> Result<Vec<Row>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;

    /// Execute a read statement and return its rows lazily.
    async fn stream(
        &self,
        statement: &str,
        params: &Params,
    ) -> Result<Box<dyn RowSource>, StoreError>;

    /// Run one statement in its own transaction.
    async fn execute_transactionally(
        &self,
        statement: &str,
        params: &Params,
    ) -> Result<QueryStatistics, StoreError> {
        let mut tx = self.begin().await?;
        match tx.execute(statement, params).await {
            Ok(stats) => {
                tx.commit().await?;
                Ok(stats)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }

    /// Run one row-returning statement in its own transaction.
    async fn query_transactionally(
        &self,
        statement: &str,
        params: &Params,
    ) -> Result<Vec<Row>, StoreError> {
        let mut tx = self.begin().await?;
        match tx.query(statement, params).await {
            Ok(rows) => {
                tx.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                rollback_quietly(tx).await;
                Err(e)
            }
        }
    }
}

/// Roll back after a failed statement. The statement's error is the one worth reporting,
/// so a rollback failure is only logged.
pub(crate) async fn rollback_quietly(tx: Box<dyn Transaction>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Rollback after failed statement also failed");
    }
}
