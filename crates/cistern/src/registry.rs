//! Registry owning the active connection source

use std::sync::Arc;

use cistern_core::{CisternError, ConnectParams, Result};
use cistern_pool::{ConnectionSource, Pool, PoolConfig};
use cistern_postgres::PostgresFactory;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::context::ConnectionContext;
use crate::executor::Executor;

/// Options for establishing a pooled PostgreSQL connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Connection parameters
    pub params: ConnectParams,
    /// Pool configuration
    pub pool: PoolConfig,
}

impl ConnectOptions {
    /// Create options with the given parameters and a default pool
    pub fn new(params: ConnectParams) -> Self {
        Self {
            params,
            pool: PoolConfig::default(),
        }
    }

    /// Set the pool configuration
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}

/// Owns the connection source the rest of the crate draws from
///
/// A registry starts empty. `connect` opens a PostgreSQL pool and
/// installs it as the source; `adopt` installs an externally built
/// source instead. There is at most one source at a time, and
/// `disconnect` must run before a new one can be installed.
pub struct Registry {
    source: RwLock<Option<Arc<dyn ConnectionSource>>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            source: RwLock::new(None),
        }
    }

    /// Open a connection pool and install it as the source
    #[tracing::instrument(skip(self, options), fields(host = %options.params.host, dbname = %options.params.dbname, pool_size = options.pool.size()))]
    pub async fn connect(&self, options: ConnectOptions) -> Result<()> {
        tracing::info!("connecting registry");
        if self.is_connected() {
            return Err(CisternError::InvalidState(
                "already connected; disconnect first".into(),
            ));
        }

        let factory = PostgresFactory::new(options.params);
        let pool = Pool::open(options.pool, factory).await?;

        let installed = {
            let mut source = self.source.write();
            if source.is_some() {
                false
            } else {
                *source = Some(Arc::new(pool.clone()));
                true
            }
        };

        if !installed {
            // Another connect won the race; discard the new pool
            if let Err(err) = pool.close_all().await {
                tracing::warn!(error = %err, "error closing redundant pool");
            }
            return Err(CisternError::InvalidState(
                "already connected; disconnect first".into(),
            ));
        }

        tracing::info!(size = pool.size(), "registry connected");
        Ok(())
    }

    /// Install an externally constructed connection source
    ///
    /// Lets callers supply their own pool or a custom source in place
    /// of the built-in PostgreSQL pool.
    pub fn adopt(&self, source: Arc<dyn ConnectionSource>) -> Result<()> {
        let mut slot = self.source.write();
        if slot.is_some() {
            return Err(CisternError::InvalidState(
                "already connected; disconnect first".into(),
            ));
        }
        tracing::info!(size = source.size(), "registry adopted connection source");
        *slot = Some(source);
        Ok(())
    }

    /// Close the active source, if any
    ///
    /// Idempotent: disconnecting an empty registry is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        let source = self.source.write().take();
        match source {
            Some(source) => {
                tracing::info!("disconnecting registry");
                source.close_all().await
            }
            None => Ok(()),
        }
    }

    /// Get the active source
    pub fn source(&self) -> Option<Arc<dyn ConnectionSource>> {
        self.source.read().clone()
    }

    /// Check whether a source is installed
    pub fn is_connected(&self) -> bool {
        self.source.read().is_some()
    }

    /// Create a connection context backed by this registry
    pub fn context(self: Arc<Self>) -> ConnectionContext {
        ConnectionContext::new(self)
    }

    /// Create an executor backed by this registry
    pub fn executor(self: Arc<Self>) -> Executor {
        Executor::new(self)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
