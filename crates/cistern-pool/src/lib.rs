//! Cistern Pool - Bounded connection pooling
//!
//! This crate provides a bounded pool of database connections with
//! checkout timeouts, strict checkin validation, and statistics tracking.
//!
//! # Example
//!
//! ```ignore
//! use cistern_pool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new(5).with_checkout_timeout_ms(5000);
//! let pool = Pool::open(config, factory).await?;
//!
//! let conn = pool.checkout().await?;
//! conn.execute("SELECT 1").await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod source;
mod stats;


pub use config::PoolConfig;
pub use pool::{ConnectionFactory, Pool, PoolEntry, PooledConn};
pub use source::ConnectionSource;
pub use stats::PoolStats;
