//! Pool configuration types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a connection pool
///
/// Controls the fixed pool size and the checkout timeout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of connections the pool opens and maintains
    size: usize,
    /// Timeout in milliseconds when checking a connection out of the pool
    checkout_timeout_ms: u64,
}

impl PoolConfig {
    /// Create a new pool configuration with the given size
    ///
    /// # Panics
    ///
    /// Panics if `size` is 0.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "size must be greater than 0, got {}", size);

        Self {
            size,
            checkout_timeout_ms: 5_000, // 5 seconds default
        }
    }

    /// Set the checkout timeout in milliseconds
    pub fn with_checkout_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.checkout_timeout_ms = timeout_ms;
        self
    }

    /// Get the pool size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the checkout timeout as a Duration
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - size: 5
    /// - checkout_timeout: 5 seconds
    fn default() -> Self {
        Self::new(5)
    }
}
