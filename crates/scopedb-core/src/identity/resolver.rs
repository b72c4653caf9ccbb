//! Username to identity resolution with a request-scoped cache.

use std::collections::HashMap;
use std::sync::Arc;

use scopedb_proto::{QueryOptions, Record};

use super::{CuratorPrefs, Identity, Permissions, Profile, UserStatus};
use crate::connection::{Connection, ConnectionRegistry};
use crate::error::{Error, Result};
use crate::query::QueryExecutor;

/// Resolves usernames to [`Identity`] values.
///
/// One resolver serves one request. Results, including "no such user", are
/// cached by username, so a repeated username never re-queries either the
/// local or the home database. Errors are not cached.
pub struct IdentityResolver {
    registry: Arc<ConnectionRegistry>,
    cache: HashMap<String, Option<Arc<Identity>>>,
}

impl IdentityResolver {
    /// Create a resolver with an empty cache.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    /// Resolve a username.
    ///
    /// Returns `Ok(None)` when there is no local record; callers treat that
    /// as anonymous. A home database that cannot be queried yields
    /// [`Error::FederatedLookupFailed`].
    pub fn resolve(
        &mut self,
        local: &mut dyn Connection,
        username: &str,
    ) -> Result<Option<Arc<Identity>>> {
        if let Some(cached) = self.cache.get(username) {
            tracing::debug!(username, "identity cache hit");
            return Ok(cached.clone());
        }

        let identity = self.lookup(local, username)?.map(Arc::new);
        self.cache.insert(username.to_string(), identity.clone());
        Ok(identity)
    }

    /// A cached resolution, without querying.
    pub fn cached(&self, username: &str) -> Option<Option<Arc<Identity>>> {
        self.cache.get(username).cloned()
    }

    /// Forget every cached identity.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    fn lookup(&self, local: &mut dyn Connection, username: &str) -> Result<Option<Identity>> {
        let mut exec = QueryExecutor::new(local);
        let Some(row) = exec.fetch_row("SELECT * FROM users WHERE user_name=?", username)? else {
            tracing::debug!(username, "no local user record");
            return Ok(None);
        };

        let id = row.get_i64("id").ok_or_else(|| {
            Error::query_failed("SELECT * FROM users WHERE user_name=?", "users row without id")
        })?;
        let status: UserStatus = row
            .get_string("status")
            .unwrap_or_else(|| UserStatus::User.as_str().to_string())
            .parse()?;
        let permissions: Permissions = exec
            .fetch_column("SELECT permission FROM permissions WHERE user_id=?", id)?
            .iter()
            .filter_map(|v| v.to_non_empty_string())
            .collect();

        let mut identity = Identity {
            username: username.to_string(),
            id,
            status,
            user_db: row.get_i64("user_db"),
            profile: Profile::from_record(&row),
            prefs: CuratorPrefs::from_record(&row),
            permissions,
        };

        if let Some(user_db) = identity.user_db {
            let remote = self.fetch_remote(user_db, username).map_err(|e| {
                tracing::error!(username, user_db, error = %e, "federated user lookup failed");
                Error::FederatedLookupFailed {
                    user_db,
                    source: Box::new(e),
                }
            })?;
            if let Some((profile, prefs)) = remote {
                identity.profile.merge(profile);
                if let Some(prefs) = prefs {
                    identity.prefs.merge(prefs);
                }
            }
        }

        tracing::debug!(username, id, status = %identity.status, "identity resolved");
        Ok(Some(identity))
    }

    /// Profile and curator preferences held by a home database.
    fn fetch_remote(
        &self,
        user_db: i64,
        username: &str,
    ) -> Result<Option<(Profile, Option<CuratorPrefs>)>> {
        let mut conn = self.registry.checkout(user_db)?;
        let mut exec = QueryExecutor::new(&mut *conn);

        let user: Option<Record> = exec.fetch_row(
            "SELECT user_name,first_name,surname,email,affiliation FROM users WHERE user_name=?",
            username,
        )?;
        let Some(user) = user.filter(|u| u.get_string("user_name").is_some()) else {
            tracing::debug!(username, user_db, "no record in home database");
            return Ok(None);
        };

        let prefs = exec
            .fetch_records(
                "SELECT * FROM curator_prefs WHERE user_name=?",
                username,
                &QueryOptions::new(),
            )?
            .first()
            .map(CuratorPrefs::from_record);

        Ok(Some((Profile::from_record(&user), prefs)))
    }
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("cached", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{SqliteConnection, SqliteConnector};

    fn local() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE users (id INTEGER PRIMARY KEY, user_name TEXT UNIQUE, first_name TEXT,
                surname TEXT, email TEXT, affiliation TEXT, status TEXT, user_db INTEGER);
            CREATE TABLE permissions (user_id INTEGER, permission TEXT);
            INSERT INTO users VALUES (1, 'alice', 'Alice', 'Smith', 'alice@example.org', 'Oxford', 'submitter', NULL);
            INSERT INTO users VALUES (2, 'mallory', 'Mallory', NULL, NULL, NULL, 'guest', NULL);
            INSERT INTO users VALUES (3, 'carol', 'Carol', NULL, NULL, NULL, 'curator', 7);
            INSERT INTO permissions VALUES (1, 'only_private');
            "#,
        )
        .unwrap();
        conn
    }

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(Arc::new(ConnectionRegistry::new(Arc::new(SqliteConnector::new()))))
    }

    #[test]
    fn test_local_identity() {
        let mut conn = local();
        let mut resolver = resolver();
        let alice = resolver.resolve(&mut conn, "alice").unwrap().unwrap();
        assert_eq!(alice.id, 1);
        assert_eq!(alice.status, UserStatus::Submitter);
        assert_eq!(alice.profile.email.as_deref(), Some("alice@example.org"));
        assert!(alice.only_private());
    }

    #[test]
    fn test_unknown_user_is_anonymous() {
        let mut conn = local();
        let mut resolver = resolver();
        assert!(resolver.resolve(&mut conn, "nobody").unwrap().is_none());
        assert_eq!(resolver.cached("nobody"), Some(None));
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let mut conn = local();
        let mut resolver = resolver();
        let err = resolver.resolve(&mut conn, "mallory").unwrap_err();
        assert!(matches!(err, Error::UnknownAccessStatus(ref s) if s == "guest"));
        assert!(resolver.cached("mallory").is_none());
    }

    #[test]
    fn test_unregistered_home_database_is_federated_failure() {
        let mut conn = local();
        let mut resolver = resolver();
        let err = resolver.resolve(&mut conn, "carol").unwrap_err();
        assert!(err.is_federated_failure());
        match err {
            Error::FederatedLookupFailed { user_db, source } => {
                assert_eq!(user_db, 7);
                assert!(matches!(*source, Error::UnknownUserDatabase(7)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
