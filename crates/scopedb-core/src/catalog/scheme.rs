//! Typed scheme definitions.
//!
//! A scheme is built field by field from validated values; its primary key
//! field names end up in statement text, so each is checked as an SQL
//! identifier on construction.

use std::collections::HashMap;

use scopedb_proto::{Params, Value};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::query::{validate_identifier, QueryExecutor};

/// A scheme and the warehouse it is materialised in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    pub id: i64,
    pub description: Option<String>,
    /// Id of the warehouse table `mv_scheme_<dbase_id>`.
    pub dbase_id: i64,
    primary_keys: Vec<String>,
    locus_index: HashMap<String, i64>,
}

impl Scheme {
    /// Create a scheme with an empty locus index.
    pub fn new<S: Into<String>>(
        id: i64,
        dbase_id: i64,
        primary_keys: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let primary_keys: Vec<String> = primary_keys.into_iter().map(Into::into).collect();
        for key in &primary_keys {
            validate_identifier(key)?;
        }
        Ok(Self {
            id,
            description: None,
            dbase_id,
            primary_keys,
            locus_index: HashMap::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Load a scheme from the `schemes` and `scheme_fields` tables.
    pub fn load(conn: &mut dyn Connection, id: i64) -> Result<Option<Self>> {
        let mut exec = QueryExecutor::new(conn);
        let Some(row) = exec.fetch_row("SELECT * FROM schemes WHERE id=?", id)? else {
            return Ok(None);
        };
        let dbase_id = row.get_i64("dbase_id").unwrap_or(id);
        let keys: Vec<String> = exec
            .fetch_column(
                "SELECT field FROM scheme_fields WHERE scheme_id=? AND primary_key ORDER BY field_order,field",
                id,
            )?
            .iter()
            .filter_map(|v| v.to_non_empty_string())
            .collect();

        let mut scheme = Self::new(id, dbase_id, keys)?;
        scheme.description = row.get_string("description");
        scheme.load_locus_index(conn)?;
        Ok(Some(scheme))
    }

    /// Read the locus positions from `scheme_warehouse_indices`.
    pub fn load_locus_index(&mut self, conn: &mut dyn Connection) -> Result<()> {
        let rows = QueryExecutor::new(conn).fetch_records(
            "SELECT locus,\"index\" FROM scheme_warehouse_indices WHERE scheme_id=?",
            self.id,
            &Default::default(),
        )?;
        self.locus_index = rows
            .iter()
            .filter_map(|r| Some((r.get_string("locus")?, r.get_i64("index")?)))
            .collect();
        tracing::debug!(scheme = self.id, loci = self.locus_index.len(), "locus index loaded");
        Ok(())
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    /// Position of a locus in warehouse profiles.
    pub fn locus_index(&self, locus: &str) -> Option<i64> {
        self.locus_index.get(locus).copied()
    }

    pub fn loci(&self) -> impl Iterator<Item = (&str, i64)> {
        self.locus_index.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Name of the warehouse table.
    pub fn warehouse_table(&self) -> String {
        format!("mv_scheme_{}", self.dbase_id)
    }

    /// Profile stored for a primary key value combination.
    ///
    /// `values` are matched to the primary key fields in order.
    pub fn profile_by_primary_keys(
        &self,
        conn: &mut dyn Connection,
        values: impl Into<Params>,
    ) -> Result<Option<Value>> {
        let values = values.into();
        if self.primary_keys.is_empty() {
            return Err(Error::query_failed(
                &self.warehouse_table(),
                format!("scheme {} has no primary key fields", self.id),
            ));
        }
        let condition = self
            .primary_keys
            .iter()
            .map(|key| format!("{}=?", key))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT profile FROM {} WHERE {}", self.warehouse_table(), condition);

        Ok(QueryExecutor::new(conn)
            .fetch_column(&sql, values)?
            .into_iter()
            .next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;

    fn conn() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE schemes (id INTEGER PRIMARY KEY, description TEXT, dbase_id INTEGER);
            CREATE TABLE scheme_fields (scheme_id INTEGER, field TEXT, primary_key BOOLEAN, field_order INTEGER);
            CREATE TABLE scheme_warehouse_indices (scheme_id INTEGER, locus TEXT, "index" INTEGER);
            CREATE TABLE mv_scheme_1 (ST INTEGER, profile TEXT);
            INSERT INTO schemes VALUES (1, 'MLST', 1);
            INSERT INTO scheme_fields VALUES (1, 'ST', 1, 1);
            INSERT INTO scheme_fields VALUES (1, 'clonal_complex', 0, 2);
            INSERT INTO scheme_warehouse_indices VALUES (1, 'abcZ', 1);
            INSERT INTO scheme_warehouse_indices VALUES (1, 'adk', 2);
            INSERT INTO mv_scheme_1 VALUES (11, '2,3,4,3,8,4,6');
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_load_scheme() {
        let mut conn = conn();
        let scheme = Scheme::load(&mut conn, 1).unwrap().unwrap();
        assert_eq!(scheme.description.as_deref(), Some("MLST"));
        assert_eq!(scheme.primary_keys(), &["ST".to_string()]);
        assert_eq!(scheme.locus_index("adk"), Some(2));
        assert_eq!(scheme.locus_index("fumC"), None);
        assert!(Scheme::load(&mut conn, 2).unwrap().is_none());
    }

    #[test]
    fn test_profile_by_primary_keys() {
        let mut conn = conn();
        let scheme = Scheme::new(1, 1, ["ST"]).unwrap();
        assert_eq!(
            scheme.profile_by_primary_keys(&mut conn, 11).unwrap(),
            Some(Value::from("2,3,4,3,8,4,6"))
        );
        assert_eq!(scheme.profile_by_primary_keys(&mut conn, 99).unwrap(), None);
    }

    #[test]
    fn test_primary_keys_must_be_identifiers() {
        assert!(matches!(
            Scheme::new(1, 1, ["ST; DROP TABLE x"]),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_key_value_count_must_match() {
        let mut conn = conn();
        let scheme = Scheme::new(1, 1, ["ST"]).unwrap();
        let err = scheme
            .profile_by_primary_keys(&mut conn, vec![Value::Int64(11), Value::Int64(1)])
            .unwrap_err();
        assert!(matches!(err, Error::QueryFailed { .. }));
    }
}
