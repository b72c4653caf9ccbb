//! Per-request access context.

use std::sync::Arc;

use crate::identity::Identity;

/// How the caller is accessing the records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Browsing and querying.
    #[default]
    Ordinary,
    /// Curation interface.
    Curate,
}

/// Everything that decides which rows a request may see.
///
/// Built fresh for each request and never cached.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    /// Resolved identity, or `None` for anonymous access.
    pub identity: Option<Arc<Identity>>,
    pub mode: AccessMode,
    /// Dataset subset to narrow the base table to.
    pub dataset_subset_id: Option<i64>,
}

impl AccessContext {
    /// Anonymous, ordinary access.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Access by a resolved identity, or anonymously when `None`.
    pub fn new(identity: Option<Arc<Identity>>, mode: AccessMode) -> Self {
        Self {
            identity,
            mode,
            dataset_subset_id: None,
        }
    }

    /// Narrow to a dataset subset.
    pub fn with_subset(mut self, set_id: Option<i64>) -> Self {
        self.dataset_subset_id = set_id;
        self
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_none()
    }
}
