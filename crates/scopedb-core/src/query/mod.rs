//! Query execution.
//!
//! Statements are written once, with `?` placeholders, and run against any
//! [`Connection`](crate::connection::Connection). The [`QueryExecutor`]
//! rewrites them for the connection's dialect and reshapes the rows into the
//! requested [`FetchMode`](scopedb_proto::FetchMode).

mod executor;
pub mod sql;

pub use executor::{execute, QueryExecutor};
pub use sql::{count_placeholders, inline_parameters, rewrite_placeholders, validate_identifier};
