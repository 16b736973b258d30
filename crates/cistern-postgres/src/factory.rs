//! Connection factory for PostgreSQL pools

use std::sync::Arc;

use async_trait::async_trait;
use cistern_core::{ConnectParams, Connection, Result};
use cistern_pool::ConnectionFactory;

use crate::connection::PostgresConnection;

/// Creates PostgreSQL connections from a fixed set of parameters
///
/// Used as the factory behind a connection pool: each call to `create`
/// opens a fresh connection to the configured database.
pub struct PostgresFactory {
    params: ConnectParams,
}

impl PostgresFactory {
    /// Create a factory for the given connection parameters
    pub fn new(params: ConnectParams) -> Self {
        Self { params }
    }

    /// Get the connection parameters
    pub fn params(&self) -> &ConnectParams {
        &self.params
    }
}

#[async_trait]
impl ConnectionFactory for PostgresFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        let conn = PostgresConnection::connect(&self.params).await?;
        Ok(Arc::new(conn))
    }
}
