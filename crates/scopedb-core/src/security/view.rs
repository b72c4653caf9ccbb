//! Installing the filtered view.

use scopedb_proto::Value;
use tracing::instrument;

use super::context::AccessContext;
use super::policy::{predicate, Memberships};
use crate::config::Settings;
use crate::connection::{Connection, Dialect};
use crate::error::{Error, Result};
use crate::query::{inline_parameters, validate_identifier, QueryExecutor};

/// Name of the installed view.
pub const TEMP_VIEW_NAME: &str = "temp_view";

/// A view installed on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledView {
    /// Name to query instead of the primary table.
    pub name: String,
    /// Table the view filters.
    pub base_table: String,
    /// `SELECT` defining the view, with `?` placeholders.
    pub defining_query: String,
    /// Values for the placeholders, in order.
    pub bound_parameters: Vec<Value>,
    /// Label of the connection holding the view.
    pub owning_connection: String,
}

/// Builds and installs the access-filtered view of the primary table.
#[derive(Debug, Clone)]
pub struct ViewBuilder<'s> {
    settings: &'s Settings,
    view_name: &'s str,
    membership_prechecks: bool,
}

impl<'s> ViewBuilder<'s> {
    /// Create a builder for an instance.
    pub fn new(settings: &'s Settings) -> Self {
        Self {
            settings,
            view_name: TEMP_VIEW_NAME,
            membership_prechecks: true,
        }
    }

    /// Install under a different name.
    pub fn with_view_name(mut self, name: &'s str) -> Self {
        self.view_name = name;
        self
    }

    /// Whether to query memberships before adding the optional clauses.
    ///
    /// When disabled the optional clauses are always included.
    pub fn with_membership_prechecks(mut self, enabled: bool) -> Self {
        self.membership_prechecks = enabled;
        self
    }

    /// Table the view is built over for a dataset subset.
    ///
    /// Subsets apply only when the instance maps them to views; a subset
    /// without a `set_view` row uses the primary table.
    pub fn base_table(&self, conn: &mut dyn Connection, set_id: Option<i64>) -> Result<String> {
        let primary = self.settings.primary_table();
        let Some(set_id) = set_id.filter(|_| self.settings.system().views) else {
            return Ok(primary.to_string());
        };

        let view = QueryExecutor::new(conn)
            .fetch_column("SELECT view FROM set_view WHERE set_id=?", set_id)?
            .into_iter()
            .find_map(|v| v.to_non_empty_string());

        match view {
            Some(view) => {
                validate_identifier(&view)?;
                tracing::debug!(set_id, view = %view, "dataset subset view");
                Ok(view)
            }
            None => Ok(primary.to_string()),
        }
    }

    /// Work out the view definition without installing it.
    pub fn plan(&self, conn: &mut dyn Connection, context: &AccessContext) -> Result<InstalledView> {
        validate_identifier(self.view_name)?;
        let base_table = self.base_table(conn, context.dataset_subset_id)?;

        let memberships = match context.identity.as_deref() {
            Some(identity) if self.membership_prechecks => Memberships::load(conn, identity.id)?,
            _ => Memberships::assume_all(),
        };
        let predicate = predicate(context, &memberships)?;

        let defining_query = format!(
            "SELECT v.* FROM {} v LEFT JOIN private_isolates p ON v.id=p.isolate_id WHERE {}",
            base_table, predicate.sql
        );

        Ok(InstalledView {
            name: self.view_name.to_string(),
            base_table,
            defining_query,
            bound_parameters: predicate.params,
            owning_connection: conn.label().to_string(),
        })
    }

    /// Install the view on `conn`, replacing any previous one of the same
    /// name, and commit.
    ///
    /// The connection must not have a transaction open. On failure the
    /// transaction is rolled back, any previous view of the same name is
    /// dropped and the error is returned as [`Error::ViewInstallationFailed`];
    /// an identity without visibility rules is reported as
    /// [`Error::UnknownAccessStatus`].
    #[instrument(skip_all, fields(
        view = self.view_name,
        user = context.identity.as_ref().map(|i| i.username.as_str()),
        mode = ?context.mode,
        set_id = context.dataset_subset_id,
    ))]
    pub fn install(&self, conn: &mut dyn Connection, context: &AccessContext) -> Result<InstalledView> {
        if conn.in_transaction() {
            return Err(self.failed(Error::Connection {
                target: conn.label().to_string(),
                message: "cannot install a view inside an open transaction".to_string(),
            }));
        }

        match self.replace(conn, context) {
            Ok(view) => {
                tracing::info!(
                    base = %view.base_table,
                    params = view.bound_parameters.len(),
                    "view installed"
                );
                Ok(view)
            }
            Err(e) => {
                if let Err(removal) = self.remove(conn) {
                    tracing::warn!(view = self.view_name, error = %removal, "could not drop previous view");
                }
                Err(self.failed(e))
            }
        }
    }

    fn replace(&self, conn: &mut dyn Connection, context: &AccessContext) -> Result<InstalledView> {
        let view = self.plan(conn, context)?;
        let create = format!(
            "CREATE TEMPORARY VIEW {} AS {}",
            view.name,
            inline_parameters(&view.defining_query, &view.bound_parameters)?
        );
        let drop = self.drop_statement(conn.dialect());

        conn.begin().map_err(|e| Error::query_failed("BEGIN", e))?;
        if let Err(e) = replace_view(conn, &drop, &create) {
            if let Err(rollback) = conn.rollback() {
                tracing::error!(error = %rollback, "rollback after failed view installation");
            }
            return Err(e);
        }
        Ok(view)
    }

    /// Drop the view from `conn` if it exists.
    pub fn remove(&self, conn: &mut dyn Connection) -> Result<()> {
        validate_identifier(self.view_name)?;
        let drop = self.drop_statement(conn.dialect());
        QueryExecutor::new(conn).execute_statement(&drop, ())?;
        Ok(())
    }

    fn drop_statement(&self, dialect: Dialect) -> String {
        format!("DROP VIEW IF EXISTS {}.{}", dialect.temp_schema(), self.view_name)
    }

    fn failed(&self, e: Error) -> Error {
        match e {
            Error::UnknownAccessStatus(_) => e,
            source => {
                tracing::error!(view = self.view_name, error = %source, "view installation failed");
                Error::ViewInstallationFailed {
                    view: self.view_name.to_string(),
                    source: Box::new(source),
                }
            }
        }
    }
}

fn replace_view(conn: &mut dyn Connection, drop: &str, create: &str) -> Result<()> {
    let mut exec = QueryExecutor::new(conn);
    exec.execute_statement(drop, ())?;
    exec.execute_statement(create, ())?;
    conn.commit().map_err(|e| Error::query_failed("COMMIT", e))
}
