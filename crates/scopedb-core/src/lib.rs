//! Access-scoped query engine.
//!
//! This crate runs parameterised queries against a primary database and any
//! number of federated user databases, and enforces row-level visibility by
//! installing a per-session filtered view of the primary record table.
//!
//! # Components
//!
//! - [`connection`]: sessions, backends and the process-wide
//!   [`ConnectionRegistry`] of federated user databases
//! - [`query`]: the [`QueryExecutor`] and its fetch modes
//! - [`identity`]: the [`IdentityResolver`] with its request-scoped cache
//! - [`security`]: visibility predicates, curation roles and the
//!   [`ViewBuilder`]
//! - [`config`]: layered [`Settings`]
//! - [`catalog`]: sparse field and scheme metadata
//! - [`Datastore`]: the request-scoped facade tying them together
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scopedb_core::{AccessMode, ConnectionRegistry, Datastore, Settings, SqliteConnector};
//! use scopedb_proto::{FetchMode, QueryOptions};
//!
//! # fn main() -> scopedb_core::Result<()> {
//! let settings = Arc::new(Settings::from_toml_strs("", "db = \"isolates.db\"", None)?);
//! let registry = Arc::new(ConnectionRegistry::new(Arc::new(SqliteConnector::new())));
//!
//! let mut datastore = Datastore::open(registry, settings)?;
//! datastore.initiate_user_dbs()?;
//! let view = datastore.initiate_view(Some("alice"), AccessMode::Ordinary, None)?;
//!
//! let rows = datastore
//!     .run_query(
//!         &format!("SELECT * FROM {view} ORDER BY id"),
//!         (),
//!         FetchMode::Records,
//!         &QueryOptions::new(),
//!     )?
//!     .into_records();
//! println!("{} visible records", rows.len());
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod config;
pub mod connection;
pub mod datastore;
pub mod error;
pub mod identity;
pub mod query;
pub mod security;

pub use config::{DatabaseType, GlobalConfig, Settings, SystemAttributes, SystemOverrides};
pub use connection::{
    Connection, ConnectionParams, ConnectionRegistry, Connector, Dialect, DriverError,
    FederatedDatabase, PooledConnection, SqliteConnection, SqliteConnector,
};
pub use datastore::Datastore;
pub use error::{ConfigError, Error, Result};
pub use identity::{Identity, IdentityResolver, UserStatus};
pub use query::{execute, QueryExecutor};
pub use security::{AccessContext, AccessMode, InstalledView, ViewBuilder};

#[cfg(feature = "postgres")]
pub use connection::{PostgresConnection, PostgresConnector};
