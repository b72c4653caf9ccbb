//! Core error types.

use thiserror::Error;

/// Errors raised by the query engine.
///
/// Every failure is returned to the caller as one of these variants; none is
/// converted into an empty result.
#[derive(Debug, Error)]
pub enum Error {
    /// The backend rejected a statement.
    #[error("query failed: {message} (statement: {statement})")]
    QueryFailed {
        /// Statement as submitted by the caller.
        statement: String,
        /// Driver message.
        message: String,
    },

    /// A federated user database could not be reached or rejected the lookup.
    #[error("federated user database {user_db} lookup failed: {source}")]
    FederatedLookupFailed {
        /// Id of the user database.
        user_db: i64,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// A user record refers to a user database that is not registered.
    #[error("user database {0} is not registered")]
    UnknownUserDatabase(i64),

    /// The identity has a status the visibility rules do not define.
    #[error("no visibility rules for access status '{0}'")]
    UnknownAccessStatus(String),

    /// The filtered view could not be installed.
    #[error("failed to install view '{view}': {source}")]
    ViewInstallationFailed {
        /// View name.
        view: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },

    /// The result could not be reshaped into the requested fetch mode.
    #[error(transparent)]
    Shape(#[from] scopedb_proto::Error),

    /// A name could not be used as an SQL identifier.
    #[error("invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),

    /// A connection could not be opened.
    #[error("cannot connect to '{target}': {message}")]
    Connection {
        /// Database name or path.
        target: String,
        /// Driver message.
        message: String,
    },

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Build a [`Error::QueryFailed`] from a statement and a driver error.
    pub fn query_failed(statement: &str, source: impl std::fmt::Display) -> Self {
        Error::QueryFailed {
            statement: statement.to_string(),
            message: source.to_string(),
        }
    }

    /// Check if this is a federated lookup failure.
    pub fn is_federated_failure(&self) -> bool {
        matches!(self, Error::FederatedLookupFailed { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file does not exist or cannot be read.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// File path.
        path: String,
    },

    /// A configuration file is not valid TOML for its section.
    #[error("invalid config in {path}: {message}")]
    Parse {
        /// File path, or `<string>`.
        path: String,
        /// Parser message.
        message: String,
    },

    /// A configuration value is out of range.
    #[error("invalid value for {field}: {message}")]
    Invalid {
        /// Dotted field name.
        field: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::query_failed("SELECT * FROM nope", "no such table: nope");
        let text = err.to_string();
        assert!(text.contains("no such table: nope"));
        assert!(text.contains("SELECT * FROM nope"));

        let err = Error::UnknownAccessStatus("guest".into());
        assert!(err.to_string().contains("guest"));
    }

    #[test]
    fn test_federated_failure_keeps_source() {
        let err = Error::FederatedLookupFailed {
            user_db: 2,
            source: Box::new(Error::UnknownUserDatabase(2)),
        };
        assert!(err.is_federated_failure());
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("not registered"));
    }
}
