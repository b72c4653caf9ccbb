//! The composed settings value.

use std::path::Path;

use serde::de::DeserializeOwned;

use super::{
    DatabaseType, GlobalConfig, SystemAttributes, SystemOverrides, DEFAULT_SEQUENCES_TABLE,
};
use crate::connection::ConnectionParams;
use crate::error::ConfigError;
use crate::query::validate_identifier;

/// Immutable configuration of one database instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    global: GlobalConfig,
    system: SystemAttributes,
}

impl Settings {
    /// Compose the layers and validate the result.
    ///
    /// This is the only place overrides are applied.
    pub fn compose(
        global: GlobalConfig,
        mut system: SystemAttributes,
        overrides: Option<&SystemOverrides>,
    ) -> Result<Self, ConfigError> {
        if let Some(overrides) = overrides {
            overrides.apply(&mut system);
        }
        let settings = Self { global, system };
        settings.validate()?;
        Ok(settings)
    }

    /// Load and compose configuration files.
    ///
    /// The global file is optional; a missing override file is an error only
    /// when a path is given.
    pub fn load(
        global_path: Option<&Path>,
        system_path: &Path,
        override_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let global = match global_path {
            Some(path) => read_toml::<GlobalConfig>(path)?,
            None => GlobalConfig::default(),
        };
        let system = read_toml::<SystemAttributes>(system_path)?;
        let overrides = override_path.map(read_toml::<SystemOverrides>).transpose()?;

        let settings = Self::compose(global, system, overrides.as_ref())?;
        tracing::debug!(db = %settings.system.db, view = %settings.system.view, "settings loaded");
        Ok(settings)
    }

    /// Compose configuration from TOML strings.
    pub fn from_toml_strs(
        global: &str,
        system: &str,
        overrides: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let global = parse_toml::<GlobalConfig>(global, "<global>")?;
        let system = parse_toml::<SystemAttributes>(system, "<system>")?;
        let overrides = overrides
            .map(|s| parse_toml::<SystemOverrides>(s, "<overrides>"))
            .transpose()?;
        Self::compose(global, system, overrides.as_ref())
    }

    /// Check the composed values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.system.db.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "system.db".to_string(),
                message: "must name the primary database".to_string(),
            });
        }
        if validate_identifier(&self.system.view).is_err() {
            return Err(ConfigError::Invalid {
                field: "system.view".to_string(),
                message: format!("'{}' is not a table name", self.system.view),
            });
        }
        if let Some(table) = &self.system.temp_sequences_view {
            if validate_identifier(table).is_err() {
                return Err(ConfigError::Invalid {
                    field: "system.temp_sequences_view".to_string(),
                    message: format!("'{}' is not a table name", table),
                });
            }
        }
        if self.system.views && !self.system.sets {
            return Err(ConfigError::Invalid {
                field: "system.views".to_string(),
                message: "subset views require sets to be enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Site-wide layer.
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    /// Instance layer, with overrides applied.
    pub fn system(&self) -> &SystemAttributes {
        &self.system
    }

    /// Table holding the primary records before filtering.
    pub fn primary_table(&self) -> &str {
        &self.system.view
    }

    /// Table queried on a `sequences` instance.
    pub fn sequences_table(&self) -> &str {
        self.system
            .temp_sequences_view
            .as_deref()
            .unwrap_or(DEFAULT_SEQUENCES_TABLE)
    }

    /// Check if the instance holds isolate records.
    pub fn is_isolate_db(&self) -> bool {
        self.system.dbtype == DatabaseType::Isolates
    }

    /// Dataset subset in effect for a request.
    ///
    /// Subsets apply only when the instance declares them. A subset pinned by
    /// the instance wins over the requested one.
    pub fn effective_set_id(&self, requested: Option<i64>) -> Option<i64> {
        if !self.system.sets {
            return None;
        }
        self.system.set_id.or(requested)
    }

    /// Connection parameters of the primary database.
    pub fn primary_connection_params(&self) -> ConnectionParams {
        let db = &self.global.database;
        ConnectionParams {
            dbase_name: self.system.db.clone(),
            host: self.system.host.clone().or_else(|| db.host.clone()),
            port: self.system.port.or(db.port),
            user: self.system.user.clone().or_else(|| db.user.clone()),
            password: self.system.password.clone().or_else(|| db.password.clone()),
        }
    }

    /// Connection parameters of a user database.
    ///
    /// Values given for the database win, then the site-wide defaults, then
    /// the instance's own credentials.
    pub fn resolve_connection(
        &self,
        dbase_name: &str,
        host: Option<String>,
        port: Option<u16>,
        user: Option<String>,
        password: Option<String>,
    ) -> ConnectionParams {
        let db = &self.global.database;
        ConnectionParams {
            dbase_name: dbase_name.to_string(),
            host: host
                .or_else(|| db.host.clone())
                .or_else(|| self.system.host.clone()),
            port: port.or(db.port).or(self.system.port),
            user: user
                .or_else(|| db.user.clone())
                .or_else(|| self.system.user.clone()),
            password: password
                .or_else(|| db.password.clone())
                .or_else(|| self.system.password.clone()),
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content, &path.display().to_string())
}

fn parse_toml<T: DeserializeOwned>(content: &str, origin: &str) -> Result<T, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}
