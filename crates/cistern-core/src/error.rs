//! Error types for cistern

use std::time::Duration;

use thiserror::Error;

/// Core error type for cistern operations
#[derive(Error, Debug)]
pub enum CisternError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Timed out waiting for a connection (timeout: {0:?})")]
    PoolTimeout(Duration),
}

/// Result type alias for cistern operations
pub type Result<T> = std::result::Result<T, CisternError>;
