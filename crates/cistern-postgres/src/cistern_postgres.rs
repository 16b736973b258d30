//! PostgreSQL driver implementation

mod connection;
mod factory;

pub use connection::PostgresConnection;
pub use factory::PostgresFactory;
