//! Source abstraction over pooled connections

use std::time::Duration;

use async_trait::async_trait;
use cistern_core::Result;

use crate::pool::{PoolEntry, PooledConn};

/// Anything that can hand out pooled connections
///
/// `Pool` is the primary implementation. Custom implementations can wrap
/// an externally managed set of connections and be adopted by a registry
/// in place of a pool.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Check a connection out of the source
    ///
    /// Waits up to the source's checkout timeout for a connection to
    /// become available.
    async fn checkout(&self) -> Result<PooledConn>;

    /// Return a previously checked-out entry to the source
    fn checkin(&self, entry: PoolEntry);

    /// Number of connections the source manages
    fn size(&self) -> usize;

    /// How long a checkout waits before timing out
    fn checkout_timeout(&self) -> Duration;

    /// Close every connection the source manages
    ///
    /// Attempts to close all connections even if some fail, returning
    /// the first failure encountered.
    async fn close_all(&self) -> Result<()>;
}
