//! Sparse (entity-attribute-value) field definitions.

use scopedb_proto::{QueryOptions, Record};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::query::QueryExecutor;

const EAV_FIELDS_QUERY: &str = "SELECT * FROM eav_fields ORDER BY field_order,field";

/// A row of the `eav_fields` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EavField {
    pub field: String,
    /// Value type (`integer`, `float`, `text`, `date`, `boolean`).
    pub value_format: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub field_order: Option<i64>,
    /// Hidden from curators.
    pub no_curate: bool,
}

impl EavField {
    fn from_record(record: &Record) -> Result<Self> {
        let field = record
            .get_string("field")
            .ok_or_else(|| Error::query_failed(EAV_FIELDS_QUERY, "eav_fields row without field"))?;
        Ok(Self {
            field,
            value_format: record.get_string("value_format"),
            description: record.get_string("description"),
            category: record.get_string("category"),
            field_order: record.get_i64("field_order"),
            no_curate: record.get_bool("no_curate").unwrap_or(false),
        })
    }
}

/// All sparse fields in display order.
pub fn eav_fields(conn: &mut dyn Connection) -> Result<Vec<EavField>> {
    QueryExecutor::new(conn)
        .fetch_records(EAV_FIELDS_QUERY, (), &QueryOptions::new())?
        .iter()
        .map(EavField::from_record)
        .collect()
}

/// Sparse field names in display order.
///
/// With `curate`, fields marked `no_curate` are left out.
pub fn eav_field_names(conn: &mut dyn Connection, curate: bool) -> Result<Vec<String>> {
    let filter = if curate { " WHERE NOT no_curate" } else { "" };
    let sql = format!("SELECT field FROM eav_fields{} ORDER BY field_order,field", filter);
    Ok(QueryExecutor::new(conn)
        .fetch_column(&sql, ())?
        .iter()
        .filter_map(|v| v.to_non_empty_string())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::SqliteConnection;

    fn conn() -> SqliteConnection {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE eav_fields (field TEXT PRIMARY KEY, value_format TEXT, description TEXT,
                category TEXT, field_order INTEGER, no_curate BOOLEAN DEFAULT 0);
            INSERT INTO eav_fields VALUES ('serogroup_titre', 'integer', NULL, 'Serology', 2, 0);
            INSERT INTO eav_fields VALUES ('ampicillin_mic', 'float', 'MIC (mg/L)', 'AMR', 1, 0);
            INSERT INTO eav_fields VALUES ('internal_flag', 'boolean', NULL, NULL, 1, 1);
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_eav_fields_in_order() {
        let mut conn = conn();
        let fields = eav_fields(&mut conn).unwrap();
        let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(names, vec!["ampicillin_mic", "internal_flag", "serogroup_titre"]);
        assert_eq!(fields[0].value_format.as_deref(), Some("float"));
        assert!(fields[1].no_curate);
        assert_eq!(fields[2].field_order, Some(2));
    }

    #[test]
    fn test_field_names_for_curation() {
        let mut conn = conn();
        assert_eq!(eav_field_names(&mut conn, false).unwrap().len(), 3);
        assert_eq!(
            eav_field_names(&mut conn, true).unwrap(),
            vec!["ampicillin_mic", "serogroup_titre"]
        );
    }
}
