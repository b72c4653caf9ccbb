//! Result-shaping error types.

use thiserror::Error;

/// Errors raised while reshaping a row set into a fetch mode.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// `keyed_by_field` was requested without naming the key field.
    #[error("key field must be supplied for keyed fetches")]
    MissingKeyField,

    /// The key field is not a column of the result.
    #[error("key field '{0}' is not a column of the result")]
    KeyFieldNotInResult(String),

    /// Two rows share the same key value.
    #[error("duplicate key value {value} for field '{field}'")]
    DuplicateKey {
        /// Key field name.
        field: String,
        /// Rendered duplicate value.
        value: String,
    },
}
