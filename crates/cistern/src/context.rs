//! Execution scopes that hold a connection for a piece of work

use std::sync::Arc;

use cistern_core::{CisternError, Connection, Result};
use cistern_pool::PooledConn;

use crate::registry::Registry;

/// A connection held for the duration of one piece of work
///
/// Pooled scopes return their connection to the pool when dropped.
/// External scopes wrap a caller-owned connection and leave its
/// lifecycle to the caller.
pub enum ConnectionScope {
    /// Checked out of the registry's source
    Pooled(PooledConn),
    /// Supplied by the caller
    External(Arc<dyn Connection>),
}

impl std::fmt::Debug for ConnectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionScope::Pooled(_) => f.debug_tuple("Pooled").finish(),
            ConnectionScope::External(_) => f.debug_tuple("External").finish(),
        }
    }
}

impl ConnectionScope {
    /// Wrap a caller-owned connection
    pub fn external(conn: Arc<dyn Connection>) -> Self {
        ConnectionScope::External(conn)
    }

    /// Get the connection held by this scope
    pub fn connection(&self) -> Arc<dyn Connection> {
        match self {
            ConnectionScope::Pooled(conn) => conn.connection().clone(),
            ConnectionScope::External(conn) => conn.clone(),
        }
    }
}

/// Checks connections out of a registry on demand
#[derive(Clone)]
pub struct ConnectionContext {
    registry: Arc<Registry>,
}

impl ConnectionContext {
    /// Create a context backed by the given registry
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Check a connection out of the registry's source
    ///
    /// Returns `NotConnected` if no source is installed.
    pub async fn scope(&self) -> Result<ConnectionScope> {
        let source = self
            .registry
            .source()
            .ok_or_else(|| CisternError::NotConnected("no connection source established".into()))?;

        let conn = source.checkout().await?;
        Ok(ConnectionScope::Pooled(conn))
    }

    /// Run `work` with a connection, returning it to the pool afterwards
    ///
    /// The connection goes back whether `work` succeeds or fails.
    pub async fn with_connection<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Connection>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let scope = self.scope().await?;
        work(scope.connection()).await
    }
}
