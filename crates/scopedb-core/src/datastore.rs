//! Request-scoped access to one database instance.

use std::sync::Arc;

use scopedb_proto::{FetchMode, Params, QueryOptions, QueryResult};

use crate::catalog::{self, EavField, Scheme};
use crate::config::Settings;
use crate::connection::{Connection, ConnectionRegistry};
use crate::error::Result;
use crate::identity::{Identity, IdentityResolver};
use crate::query::QueryExecutor;
use crate::security::{AccessContext, AccessMode, InstalledView, ViewBuilder};

/// Everything one request needs to query an instance.
///
/// A datastore owns its primary connection, so the view it installs is
/// seen by this request only. Identities are cached for the datastore's
/// lifetime. Dropping it rolls back any open transaction.
pub struct Datastore {
    conn: Box<dyn Connection>,
    registry: Arc<ConnectionRegistry>,
    settings: Arc<Settings>,
    resolver: IdentityResolver,
    view: Option<InstalledView>,
    primary_table: Option<String>,
}

impl Datastore {
    /// Create a datastore over an open primary connection.
    pub fn new(
        conn: Box<dyn Connection>,
        registry: Arc<ConnectionRegistry>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            conn,
            resolver: IdentityResolver::new(Arc::clone(&registry)),
            registry,
            settings,
            view: None,
            primary_table: None,
        }
    }

    /// Open the instance's primary database and create a datastore over it.
    pub fn open(registry: Arc<ConnectionRegistry>, settings: Arc<Settings>) -> Result<Self> {
        let conn = registry.connect(&settings.primary_connection_params())?;
        Ok(Self::new(conn, registry, settings))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The primary connection.
    pub fn connection(&mut self) -> &mut dyn Connection {
        self.conn.as_mut()
    }

    /// An executor over the primary connection.
    pub fn executor(&mut self) -> QueryExecutor<'_> {
        QueryExecutor::new(self.conn.as_mut())
    }

    /// Run a statement on the primary connection.
    pub fn run_query(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        mode: FetchMode,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        self.executor().execute(sql, params, mode, options)
    }

    /// Run a statement on a user database.
    pub fn run_federated_query(
        &self,
        user_db: i64,
        sql: &str,
        params: impl Into<Params>,
        mode: FetchMode,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let mut conn = self.registry.checkout(user_db)?;
        QueryExecutor::new(&mut *conn).execute(sql, params, mode, options)
    }

    /// Register the user databases listed in the `user_dbases` table.
    pub fn initiate_user_dbs(&mut self) -> Result<usize> {
        self.registry
            .load_user_databases(self.conn.as_mut(), &self.settings)
    }

    /// Resolve a user. `None` in, or no such user, means anonymous.
    pub fn user_info(&mut self, username: Option<&str>) -> Result<Option<Arc<Identity>>> {
        match username {
            Some(username) => self.resolver.resolve(self.conn.as_mut(), username),
            None => Ok(None),
        }
    }

    /// Check if a user has curator rights.
    pub fn is_curator(&mut self, username: Option<&str>) -> Result<bool> {
        Ok(self
            .user_info(username)?
            .is_some_and(|identity| identity.is_curator()))
    }

    /// Dataset subset in effect for a request.
    ///
    /// On top of [`Settings::effective_set_id`], an instance with
    /// `only_sets` restricts ordinary access to its first subset when none
    /// is requested.
    pub fn set_id(&mut self, requested: Option<i64>, mode: AccessMode) -> Result<Option<i64>> {
        if let Some(set_id) = self.settings.effective_set_id(requested) {
            return Ok(Some(set_id));
        }
        let system = self.settings.system();
        if !(system.sets && system.only_sets && mode == AccessMode::Ordinary) {
            return Ok(None);
        }
        Ok(self
            .executor()
            .fetch_column("SELECT id FROM sets ORDER BY display_order,description", ())?
            .first()
            .and_then(|v| v.as_i64()))
    }

    /// Install the filtered view for a user and make it the primary table.
    ///
    /// Returns the table name to query. `sequences` instances have no
    /// per-user filtering and get their sequence table. A failure leaves no
    /// table to query, drops any view installed earlier and must be treated
    /// as fatal to the request.
    pub fn initiate_view(
        &mut self,
        username: Option<&str>,
        mode: AccessMode,
        set_id: Option<i64>,
    ) -> Result<String> {
        self.primary_table = None;
        if !self.settings.is_isolate_db() {
            let table = self.settings.sequences_table().to_string();
            self.primary_table = Some(table.clone());
            return Ok(table);
        }

        let previous = self.view.take();
        let context = match self.access_context(username, mode, set_id) {
            Ok(context) => context,
            Err(e) => {
                if previous.is_some() {
                    if let Err(removal) = ViewBuilder::new(&self.settings).remove(self.conn.as_mut())
                    {
                        tracing::warn!(error = %removal, "could not drop previous view");
                    }
                }
                return Err(e);
            }
        };

        let view = ViewBuilder::new(&self.settings).install(self.conn.as_mut(), &context)?;
        let name = view.name.clone();
        self.primary_table = Some(name.clone());
        self.view = Some(view);
        Ok(name)
    }

    fn access_context(
        &mut self,
        username: Option<&str>,
        mode: AccessMode,
        set_id: Option<i64>,
    ) -> Result<AccessContext> {
        let identity = self.user_info(username)?;
        let set_id = self.set_id(set_id, mode)?;
        Ok(AccessContext::new(identity, mode).with_subset(set_id))
    }

    /// Table callers should query for primary records, once
    /// [`initiate_view`](Self::initiate_view) has succeeded.
    pub fn primary_table(&self) -> Option<&str> {
        self.primary_table.as_deref()
    }

    /// The view installed by [`initiate_view`](Self::initiate_view).
    pub fn installed_view(&self) -> Option<&InstalledView> {
        self.view.as_ref()
    }

    pub fn eav_fields(&mut self) -> Result<Vec<EavField>> {
        catalog::eav_fields(self.conn.as_mut())
    }

    /// Sparse field names; `curate` leaves out `no_curate` fields.
    pub fn eav_field_names(&mut self, curate: bool) -> Result<Vec<String>> {
        catalog::eav_field_names(self.conn.as_mut(), curate)
    }

    /// Load a scheme definition.
    pub fn scheme(&mut self, id: i64) -> Result<Option<Scheme>> {
        Scheme::load(self.conn.as_mut(), id)
    }
}

impl Drop for Datastore {
    fn drop(&mut self) {
        if self.conn.in_transaction() {
            if let Err(e) = self.conn.rollback() {
                tracing::warn!(connection = self.conn.label(), error = %e, "rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Datastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("connection", &self.conn.label())
            .field("primary_table", &self.primary_table)
            .field("resolver", &self.resolver)
            .finish()
    }
}
