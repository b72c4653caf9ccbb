//! Database connections.
//!
//! A [`Connection`] is one database session. Everything that is scoped to a
//! session, such as temporary views and open transactions, lives and dies
//! with it. Connections are opened by a [`Connector`] from
//! [`ConnectionParams`] and handed out by the
//! [`ConnectionRegistry`](registry::ConnectionRegistry).

pub mod registry;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use scopedb_proto::{RowSet, Value};
use thiserror::Error;

pub use registry::{ConnectionRegistry, FederatedDatabase, PooledConnection};
pub use sqlite::{SqliteConnection, SqliteConnector};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresConnection, PostgresConnector};

/// Error reported by a database driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    /// Create a driver error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// SQL dialect of a connection, as far as statement text is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// SQLite: numbered `?N` placeholders, `temp` schema.
    Sqlite,
    /// PostgreSQL: numbered `$N` placeholders, `pg_temp` schema.
    Postgres,
}

impl Dialect {
    /// Prefix of a numbered placeholder.
    pub fn placeholder_prefix(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "?",
            Dialect::Postgres => "$",
        }
    }

    /// Schema holding session-scoped temporary objects.
    pub fn temp_schema(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "temp",
            Dialect::Postgres => "pg_temp",
        }
    }
}

/// A single database session.
///
/// Statements passed to a connection are already in the connection's native
/// placeholder syntax; the [`QueryExecutor`](crate::query::QueryExecutor)
/// performs the rewriting.
pub trait Connection: Send {
    /// Dialect of this connection.
    fn dialect(&self) -> Dialect;

    /// Human-readable name of the session, used in logs and view ownership.
    fn label(&self) -> &str;

    /// Run a statement and collect its rows.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, DriverError>;

    /// Run a statement that returns no rows; returns the affected row count.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, DriverError>;

    /// Open a transaction.
    fn begin(&mut self) -> Result<(), DriverError>;

    /// Commit the open transaction. A no-op outside a transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the open transaction. A no-op outside a transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Check if a transaction is open.
    fn in_transaction(&self) -> bool;
}

/// Where to find a database and how to log in to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConnectionParams {
    /// Database name (a file name for SQLite).
    pub dbase_name: String,
    /// Host name.
    pub host: Option<String>,
    /// TCP port.
    pub port: Option<u16>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
}

impl ConnectionParams {
    /// Parameters naming only a database.
    pub fn new(dbase_name: impl Into<String>) -> Self {
        Self {
            dbase_name: dbase_name.into(),
            ..Default::default()
        }
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

/// Opens connections from parameters.
pub trait Connector: Send + Sync {
    /// Open a new session.
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>, DriverError>;
}
