//! Connection registry: federated user databases and their connection pool.
//!
//! The registry is the only state shared between requests. It holds the
//! federated user-database references, loaded once from the `user_dbases`
//! table, and an idle pool of connections to them. A checked-out connection
//! is owned by exactly one request until its guard is dropped.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use scopedb_proto::{QueryOptions, Record};

use super::{Connection, ConnectionParams, Connector};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::query::QueryExecutor;

/// Default number of idle connections kept per user database.
pub const DEFAULT_MAX_IDLE_PER_DATABASE: usize = 4;

/// A registered federated user database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FederatedDatabase {
    /// Id of the `user_dbases` row.
    pub id: i64,
    /// How to reach it.
    pub params: ConnectionParams,
    /// Name shown to users.
    pub display_name: String,
}

impl FederatedDatabase {
    /// Create a federated database reference.
    pub fn new(id: i64, params: ConnectionParams, display_name: impl Into<String>) -> Self {
        Self {
            id,
            params,
            display_name: display_name.into(),
        }
    }

    /// Build a reference from a `user_dbases` row.
    ///
    /// Connection fields missing from the row fall back to the global
    /// configuration, then to the instance settings.
    fn from_record(record: &Record, settings: &Settings) -> Result<Self> {
        let id = record.get_i64("id").ok_or_else(|| {
            Error::query_failed("SELECT * FROM user_dbases", "user_dbases row without id")
        })?;
        let dbase_name = record.get_string("dbase_name").ok_or_else(|| {
            Error::query_failed(
                "SELECT * FROM user_dbases",
                format!("user_dbases row {} has no dbase_name", id),
            )
        })?;

        let port = match record.get_i64("dbase_port") {
            Some(port) => Some(u16::try_from(port).map_err(|_| {
                Error::query_failed(
                    "SELECT * FROM user_dbases",
                    format!("user_dbases row {} has invalid port {}", id, port),
                )
            })?),
            None => None,
        };

        let params = settings.resolve_connection(
            &dbase_name,
            record.get_string("dbase_host"),
            port,
            record.get_string("dbase_user"),
            record.get_string("dbase_password"),
        );
        let display_name = record.get_string("name").unwrap_or(dbase_name);

        Ok(Self::new(id, params, display_name))
    }
}

#[derive(Default)]
struct UserDatabases {
    /// Set once the `user_dbases` table has been read.
    table_loaded: bool,
    dbs: BTreeMap<i64, FederatedDatabase>,
}

/// Process-wide registry of connections.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    user_dbs: RwLock<UserDatabases>,
    idle: Mutex<HashMap<i64, Vec<Box<dyn Connection>>>>,
    max_idle_per_database: usize,
}

impl ConnectionRegistry {
    /// Create a registry that opens connections with `connector`.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            user_dbs: RwLock::new(UserDatabases::default()),
            idle: Mutex::new(HashMap::new()),
            max_idle_per_database: DEFAULT_MAX_IDLE_PER_DATABASE,
        }
    }

    /// Set how many idle connections are kept per user database.
    pub fn with_max_idle(mut self, max: usize) -> Self {
        self.max_idle_per_database = max;
        self
    }

    /// Open a fresh, unpooled connection (used for primary databases).
    pub fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>> {
        self.connector.connect(params).map_err(|e| Error::Connection {
            target: params.dbase_name.clone(),
            message: e.to_string(),
        })
    }

    /// Load the federated user databases from the `user_dbases` table.
    ///
    /// Runs once per registry; later calls return the number registered.
    /// Databases registered directly beforehand are kept.
    pub fn load_user_databases(
        &self,
        primary: &mut dyn Connection,
        settings: &Settings,
    ) -> Result<usize> {
        {
            let user_dbs = self.user_dbs.read();
            if user_dbs.table_loaded {
                return Ok(user_dbs.dbs.len());
            }
        }

        let records = QueryExecutor::new(primary).fetch_records(
            "SELECT * FROM user_dbases ORDER BY id",
            (),
            &QueryOptions::new(),
        )?;

        let mut dbs = BTreeMap::new();
        for record in &records {
            let db = FederatedDatabase::from_record(record, settings)?;
            tracing::debug!(id = db.id, name = %db.display_name, "registered user database");
            dbs.insert(db.id, db);
        }

        let mut guard = self.user_dbs.write();
        if !guard.table_loaded {
            for (id, db) in dbs {
                guard.dbs.entry(id).or_insert(db);
            }
            guard.table_loaded = true;
        }
        let loaded = guard.dbs.len();
        tracing::info!(count = loaded, "user databases loaded");
        Ok(loaded)
    }

    /// Register a user database directly.
    pub fn register_user_database(&self, db: FederatedDatabase) {
        self.user_dbs.write().dbs.insert(db.id, db);
    }

    /// Look up a registered user database.
    pub fn user_database(&self, id: i64) -> Option<FederatedDatabase> {
        self.user_dbs.read().dbs.get(&id).cloned()
    }

    /// All registered user databases, ordered by id.
    pub fn user_databases(&self) -> Vec<FederatedDatabase> {
        self.user_dbs.read().dbs.values().cloned().collect()
    }

    /// Check out a connection to a user database.
    ///
    /// Reuses an idle connection when one is available. The connection is
    /// returned to the pool when the guard is dropped.
    pub fn checkout(self: &Arc<Self>, user_db: i64) -> Result<PooledConnection> {
        let pooled = self
            .idle
            .lock()
            .get_mut(&user_db)
            .and_then(Vec::pop);

        let conn = match pooled {
            Some(conn) => conn,
            None => {
                let db = self
                    .user_database(user_db)
                    .ok_or(Error::UnknownUserDatabase(user_db))?;
                tracing::debug!(id = user_db, name = %db.display_name, "opening user database connection");
                self.connect(&db.params)?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            user_db,
            registry: Arc::clone(self),
        })
    }

    /// Number of idle connections held for a user database.
    pub fn idle_count(&self, user_db: i64) -> usize {
        self.idle.lock().get(&user_db).map_or(0, Vec::len)
    }

    fn checkin(&self, user_db: i64, mut conn: Box<dyn Connection>) {
        if conn.in_transaction() {
            if let Err(e) = conn.rollback() {
                tracing::warn!(id = user_db, error = %e, "discarding connection that failed to roll back");
                return;
            }
        }
        let mut idle = self.idle.lock();
        let slot = idle.entry(user_db).or_default();
        if slot.len() < self.max_idle_per_database {
            slot.push(conn);
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("user_dbs", &self.user_databases().len())
            .field("max_idle_per_database", &self.max_idle_per_database)
            .finish()
    }
}

/// A connection checked out of the registry.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    user_db: i64,
    registry: Arc<ConnectionRegistry>,
}

impl PooledConnection {
    /// Id of the user database this connection belongs to.
    pub fn user_db(&self) -> i64 {
        self.user_db
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the connection out.
        self.conn.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.registry.checkin(self.user_db, conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::sqlite::IN_MEMORY;
    use crate::connection::{SqliteConnection, SqliteConnector};

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(Arc::new(SqliteConnector::new())))
    }

    #[test]
    fn test_unknown_user_database() {
        let registry = registry();
        let err = registry.checkout(9).err().unwrap();
        assert!(matches!(err, Error::UnknownUserDatabase(9)));
    }

    #[test]
    fn test_checkout_returns_connection_to_pool() {
        let registry = registry();
        registry.register_user_database(FederatedDatabase::new(
            1,
            ConnectionParams::new(IN_MEMORY),
            "users",
        ));

        {
            let conn = registry.checkout(1).unwrap();
            assert_eq!(conn.user_db(), 1);
            assert_eq!(registry.idle_count(1), 0);
        }
        assert_eq!(registry.idle_count(1), 1);

        // The idle connection is reused rather than a second one opened.
        let _a = registry.checkout(1).unwrap();
        assert_eq!(registry.idle_count(1), 0);
        let _b = registry.checkout(1).unwrap();
        drop(_a);
        drop(_b);
        assert_eq!(registry.idle_count(1), 2);
    }

    #[test]
    fn test_pool_is_bounded() {
        let registry = Arc::new(
            ConnectionRegistry::new(Arc::new(SqliteConnector::new())).with_max_idle(1),
        );
        registry.register_user_database(FederatedDatabase::new(
            1,
            ConnectionParams::new(IN_MEMORY),
            "users",
        ));
        let a = registry.checkout(1).unwrap();
        let b = registry.checkout(1).unwrap();
        drop(a);
        drop(b);
        assert_eq!(registry.idle_count(1), 1);
    }

    #[test]
    fn test_checkin_rolls_back_open_transaction() {
        let registry = registry();
        registry.register_user_database(FederatedDatabase::new(
            1,
            ConnectionParams::new(IN_MEMORY),
            "users",
        ));
        {
            let mut conn = registry.checkout(1).unwrap();
            conn.begin().unwrap();
        }
        let conn = registry.checkout(1).unwrap();
        assert!(!conn.in_transaction());
    }

    #[test]
    fn test_table_loads_after_direct_registration() {
        let registry = registry();
        registry.register_user_database(FederatedDatabase::new(
            7,
            ConnectionParams::new(IN_MEMORY),
            "direct",
        ));

        let mut primary = SqliteConnection::open_in_memory().unwrap();
        primary
            .execute_batch(
                r#"
                CREATE TABLE user_dbases (id INTEGER PRIMARY KEY, name TEXT, dbase_name TEXT,
                    dbase_host TEXT, dbase_port INTEGER, dbase_user TEXT, dbase_password TEXT);
                INSERT INTO user_dbases VALUES (1, 'Site users', 'users.db', NULL, NULL, NULL, NULL);
                INSERT INTO user_dbases VALUES (7, 'Shadowed', 'other.db', NULL, NULL, NULL, NULL);
                "#,
            )
            .unwrap();
        let settings = Settings::from_toml_strs("", "db = \"isolates.db\"", None).unwrap();

        assert_eq!(registry.load_user_databases(&mut primary, &settings).unwrap(), 2);
        assert_eq!(registry.user_database(1).unwrap().display_name, "Site users");
        assert_eq!(registry.user_database(7).unwrap().display_name, "direct");

        primary.execute_batch("DELETE FROM user_dbases").unwrap();
        assert_eq!(registry.load_user_databases(&mut primary, &settings).unwrap(), 2);
    }
}
