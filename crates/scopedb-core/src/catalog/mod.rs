//! Schema metadata stored in the database.

pub mod eav;
pub mod scheme;

pub use eav::{eav_field_names, eav_fields, EavField};
pub use scheme::Scheme;
