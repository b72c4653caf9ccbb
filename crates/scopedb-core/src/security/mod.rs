//! Row-level visibility.
//!
//! Visibility is enforced by a session-scoped temporary view over the primary
//! table. The view's `WHERE` clause is an OR of [predicate
//! fragments](predicate), chosen by the [policy] for the request's
//! [`AccessContext`]. Once installed, callers query the view instead of the
//! primary table.

pub mod context;
pub mod policy;
pub mod predicate;
pub mod view;

pub use context::{AccessContext, AccessMode};
pub use policy::{CurationRole, Memberships};
pub use predicate::{Fragment, Predicate, PredicateBuilder};
pub use view::{InstalledView, ViewBuilder, TEMP_VIEW_NAME};
