//! Layered configuration.
//!
//! Three layers are composed once, at [`Settings::compose`]:
//!
//! 1. [`GlobalConfig`]: site-wide defaults (database credentials, paths),
//! 2. [`SystemAttributes`]: the per-instance description,
//! 3. [`SystemOverrides`]: an optional per-instance override file.
//!
//! The resulting [`Settings`] is immutable and passed by reference into every
//! component that needs it.

mod settings;

pub use settings::Settings;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default name of the primary record table.
pub const DEFAULT_VIEW: &str = "isolates";

/// Default name of the sequence table of a `sequences` instance.
pub const DEFAULT_SEQUENCES_TABLE: &str = "sequences";

/// Site-wide database credentials used when an instance gives none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseDefaults {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// Site-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Connection defaults shared by all instances.
    pub database: DatabaseDefaults,
    /// Directory holding uploaded query files.
    pub secure_tmp_dir: Option<PathBuf>,
}

/// What kind of records an instance holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Isolate records, filtered per user.
    #[default]
    Isolates,
    /// Sequence definitions; no per-user filtering.
    Sequences,
}

/// Per-instance description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemAttributes {
    /// Primary database name.
    pub db: String,
    pub dbtype: DatabaseType,
    /// Table or view holding the primary records.
    pub view: String,
    pub description: Option<String>,
    /// The instance declares dataset subsets.
    pub sets: bool,
    /// Dataset subsets map to their own views (`set_view` table).
    pub views: bool,
    /// Subset pinned by the instance; overrides the requested one.
    pub set_id: Option<i64>,
    /// Ordinary access defaults to the first subset when none is requested.
    pub only_sets: bool,
    /// Table used in place of `sequences` for `sequences` instances.
    pub temp_sequences_view: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Default for SystemAttributes {
    fn default() -> Self {
        Self {
            db: String::new(),
            dbtype: DatabaseType::default(),
            view: DEFAULT_VIEW.to_string(),
            description: None,
            sets: false,
            views: false,
            set_id: None,
            only_sets: false,
            temp_sequences_view: None,
            host: None,
            port: None,
            user: None,
            password: None,
        }
    }
}

/// Per-instance override file. Every key present replaces the attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemOverrides {
    pub db: Option<String>,
    pub dbtype: Option<DatabaseType>,
    pub view: Option<String>,
    pub description: Option<String>,
    pub sets: Option<bool>,
    pub views: Option<bool>,
    pub set_id: Option<i64>,
    pub only_sets: Option<bool>,
    pub temp_sequences_view: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SystemOverrides {
    /// Apply the overrides to a set of attributes.
    pub fn apply(&self, system: &mut SystemAttributes) {
        if let Some(db) = &self.db {
            system.db = db.clone();
        }
        if let Some(dbtype) = self.dbtype {
            system.dbtype = dbtype;
        }
        if let Some(view) = &self.view {
            system.view = view.clone();
        }
        if self.description.is_some() {
            system.description = self.description.clone();
        }
        if let Some(sets) = self.sets {
            system.sets = sets;
        }
        if let Some(views) = self.views {
            system.views = views;
        }
        if self.set_id.is_some() {
            system.set_id = self.set_id;
        }
        if let Some(only_sets) = self.only_sets {
            system.only_sets = only_sets;
        }
        if self.temp_sequences_view.is_some() {
            system.temp_sequences_view = self.temp_sequences_view.clone();
        }
        if self.host.is_some() {
            system.host = self.host.clone();
        }
        if self.port.is_some() {
            system.port = self.port;
        }
        if self.user.is_some() {
            system.user = self.user.clone();
        }
        if self.password.is_some() {
            system.password = self.password.clone();
        }
    }
}
