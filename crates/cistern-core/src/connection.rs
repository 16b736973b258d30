//! Connection trait and transaction status tracking

use crate::{QueryResult, Result};
use async_trait::async_trait;

/// Where a connection stands in its transaction lifecycle
///
/// Drivers keep this current as statements run: a failed statement
/// inside an open transaction moves the connection to `Error`, and
/// only a rollback brings it back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// No transaction in progress
    Idle,
    /// A transaction is open
    InTransaction,
    /// A transaction is open but a statement inside it failed
    Error,
}

impl TransactionStatus {
    /// Whether a transaction is currently open, including the failed state
    pub fn in_transaction(&self) -> bool {
        matches!(
            self,
            TransactionStatus::InTransaction | TransactionStatus::Error
        )
    }
}

/// A database connection
///
/// Implementations are handled as `Arc<dyn Connection>` throughout;
/// exclusive use is enforced by the pool, not by `&mut` receivers.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgresql")
    fn driver_name(&self) -> &str;

    /// Run a single SQL statement and collect its result
    ///
    /// Statements that return rows fill `rows`; data-modifying
    /// statements report `affected_rows` instead.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;

    /// Open a transaction on this connection
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> Result<()>;

    /// Current transaction state of this connection
    fn transaction_status(&self) -> TransactionStatus;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
