//! scopedb value and result types.
//!
//! This crate defines the runtime types shared by the query engine and its
//! consumers:
//!
//! - [`value`] - Runtime value type for bound parameters and result cells
//! - [`record`] - Named-column rows and raw driver row sets
//! - [`result`] - Fetch modes and the result shapes they produce
//! - [`error`] - Errors raised while reshaping results

pub mod error;
pub mod record;
pub mod result;
pub mod value;

pub use error::Error;
pub use record::{Record, RowSet};
pub use result::{FetchMode, KeyedRecords, QueryOptions, QueryResult};
pub use value::{Params, Value};
