//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Statistics about a connection pool's current state
///
/// Provides insight into pool utilization and health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Total number of connections the pool manages
    size: usize,
    /// Number of idle connections available in the pool
    idle: usize,
    /// Number of connections currently checked out
    in_use: usize,
    /// Number of checkouts waiting for a connection
    waiting: usize,
}

impl PoolStats {
    /// Create new pool statistics
    pub fn new(size: usize, idle: usize, in_use: usize, waiting: usize) -> Self {
        Self {
            size,
            idle,
            in_use,
            waiting,
        }
    }

    /// Get the pool size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the number of idle connections
    pub fn idle(&self) -> usize {
        self.idle
    }

    /// Get the number of checked-out connections
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Get the number of waiting checkouts
    pub fn waiting(&self) -> usize {
        self.waiting
    }

    /// Calculate pool utilization as a fraction (0.0 to 1.0)
    ///
    /// Returns 0.0 if size is 0 to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.in_use as f64 / self.size as f64
        }
    }

    /// Check if every connection is checked out
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.size > 0
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new(0, 0, 0, 0)
    }
}
