//! Connection parameters

use serde::{Deserialize, Serialize};

/// Parameters for opening a database connection
///
/// The `Debug` output redacts the password so the struct is safe to
/// log at any level.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Username
    pub user: String,
    /// Password, if the server requires one
    pub password: Option<String>,
}

impl ConnectParams {
    /// Create parameters for the given host and database
    pub fn new(host: &str, dbname: &str) -> Self {
        Self {
            host: host.to_string(),
            dbname: dbname.to_string(),
            ..Self::default()
        }
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username
    pub fn with_user(mut self, user: &str) -> Self {
        self.user = user.to_string();
        self
    }

    /// Set the password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }
}

impl Default for ConnectParams {
    /// Default parameters matching a stock local PostgreSQL install
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
        }
    }
}

impl std::fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field(
                "password",
                &self.password.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
