//! Cistern - Pooled connections and execution contexts for PostgreSQL
//!
//! This crate ties the pool, driver, and execution layers together. A
//! [`Registry`] owns the active connection source, [`ConnectionContext`]
//! checks connections out for the duration of a piece of work, and
//! [`Executor`] runs statements and transactions on top of that.
//!
//! # Example
//!
//! ```ignore
//! use cistern::{ConnectOptions, ConnectParams, Registry, TxOutcome};
//!
//! let registry = Arc::new(Registry::new());
//! registry
//!     .connect(ConnectOptions::new(ConnectParams::new("localhost", "app")))
//!     .await?;
//!
//! let executor = registry.clone().executor();
//! let result = executor.exec("SELECT 1").await?;
//!
//! let inserted = executor
//!     .transaction(|conn| async move {
//!         conn.execute("INSERT INTO events (kind) VALUES ('signup')").await?;
//!         Ok(TxOutcome::Commit(()))
//!     })
//!     .await?;
//! ```

mod context;
mod executor;
mod registry;


pub use context::{ConnectionContext, ConnectionScope};
pub use executor::{Executor, TxOutcome};
pub use registry::{ConnectOptions, Registry};

pub use cistern_core::{
    CisternError, ConnectParams, Connection, QueryResult, Result, Row, TransactionStatus, Value,
};
pub use cistern_pool::{
    ConnectionFactory, ConnectionSource, Pool, PoolConfig, PoolEntry, PoolStats, PooledConn,
};
pub use cistern_postgres::{PostgresConnection, PostgresFactory};
