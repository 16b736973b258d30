//! Cistern Core - shared abstractions for the connection layer
//!
//! This crate provides the traits and types the other cistern crates
//! depend on. It defines:
//!
//! - `Connection` - Trait implemented by database drivers
//! - `TransactionStatus` - Per-connection transaction state
//! - `ConnectParams` - Server connection parameters
//! - Common types like `Value`, `Row`, `QueryResult`
//! - `CisternError` and the crate-wide `Result` alias

mod connection;
mod error;
mod params;
mod types;

pub use connection::*;
pub use error::*;
pub use params::*;
pub use types::*;
