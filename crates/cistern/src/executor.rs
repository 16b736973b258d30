//! Statement and transaction execution on scoped connections

use std::sync::Arc;

use cistern_core::{CisternError, Connection, QueryResult, Result, TransactionStatus};

use crate::context::{ConnectionContext, ConnectionScope};
use crate::registry::Registry;

/// How a transaction body asks to finish
///
/// `Commit` carries the value to hand back after the transaction
/// commits. `Rollback` discards the transaction's work without
/// treating it as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome<T> {
    /// Commit the transaction and return the value
    Commit(T),
    /// Roll the transaction back
    Rollback,
}

/// Runs statements and transactions against scoped connections
#[derive(Clone)]
pub struct Executor {
    context: ConnectionContext,
}

impl Executor {
    /// Create an executor backed by the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            context: ConnectionContext::new(registry),
        }
    }

    /// Get the underlying connection context
    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// Execute a statement on a fresh scope
    pub async fn exec(&self, sql: &str) -> Result<QueryResult> {
        let scope = self.context.scope().await?;
        self.exec_on(&scope, sql).await
    }

    /// Execute a statement on an existing scope
    #[tracing::instrument(skip(self, scope, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn exec_on(&self, scope: &ConnectionScope, sql: &str) -> Result<QueryResult> {
        let conn = scope.connection();
        let result = conn.execute(sql).await.map_err(into_query_error)?;

        tracing::debug!(
            row_count = result.row_count(),
            affected_rows = result.affected_rows,
            "statement executed"
        );
        Ok(result)
    }

    /// Run `body` inside a transaction on a fresh scope
    ///
    /// See [`Executor::transaction_on`] for the semantics.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> Result<Option<T>>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: std::future::Future<Output = Result<TxOutcome<T>>>,
    {
        let scope = self.context.scope().await?;
        self.transaction_on(&scope, body).await
    }

    /// Run `body` inside a transaction on an existing scope
    ///
    /// Begins a transaction unless the scope's connection already has
    /// one open, in which case the body joins it: `Commit` defers to
    /// the outermost level and `Rollback` aborts the whole transaction.
    ///
    /// Returns `Ok(Some(value))` when the body's work committed,
    /// `Ok(None)` when it was rolled back, and the body's error (after
    /// rolling back) when the body failed.
    pub async fn transaction_on<T, F, Fut>(
        &self,
        scope: &ConnectionScope,
        body: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: std::future::Future<Output = Result<TxOutcome<T>>>,
    {
        let conn = scope.connection();
        let nested = conn.transaction_status().in_transaction();

        if !nested {
            conn.begin().await.map_err(into_query_error)?;
            tracing::debug!("transaction started");
        }

        match body(conn.clone()).await {
            Ok(TxOutcome::Commit(value)) => {
                if nested {
                    return Ok(Some(value));
                }
                match conn.transaction_status() {
                    TransactionStatus::InTransaction => {
                        conn.commit().await.map_err(into_query_error)?;
                        tracing::debug!("transaction committed");
                        Ok(Some(value))
                    }
                    // A failed statement aborted the transaction; clear it
                    TransactionStatus::Error => {
                        conn.rollback().await.map_err(into_query_error)?;
                        tracing::debug!("aborted transaction rolled back");
                        Ok(None)
                    }
                    // A nested rollback already ended the transaction
                    TransactionStatus::Idle => Ok(None),
                }
            }
            Ok(TxOutcome::Rollback) => {
                if conn.transaction_status().in_transaction() {
                    conn.rollback().await.map_err(into_query_error)?;
                    tracing::debug!("transaction rolled back");
                }
                Ok(None)
            }
            Err(err) => {
                if conn.transaction_status().in_transaction() {
                    if let Err(rollback_err) = conn.rollback().await {
                        tracing::warn!(
                            error = %rollback_err,
                            "rollback after failed transaction body also failed"
                        );
                    }
                }
                Err(into_query_error(err))
            }
        }
    }

    /// Roll back the open transaction on a scope
    ///
    /// Returns `InvalidState` if the scope's connection has no open
    /// transaction.
    pub async fn rollback(&self, scope: &ConnectionScope) -> Result<()> {
        let conn = scope.connection();
        if !conn.transaction_status().in_transaction() {
            return Err(CisternError::InvalidState(
                "no transaction in progress".into(),
            ));
        }
        conn.rollback().await.map_err(into_query_error)
    }
}

/// Driver-reported failures surface as query errors
fn into_query_error(err: CisternError) -> CisternError {
    match err {
        CisternError::Driver(message) => CisternError::Query(message),
        other => other,
    }
}
