//! Row types returned by the query engine.

use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::value::Value;

/// The raw output of a statement: column names plus positional rows.
///
/// This is what a driver hands back before the executor reshapes it into a
/// [`crate::FetchMode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in select order.
    pub columns: Arc<[String]>,
    /// Rows; each row has one value per column.
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Create a row set.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.into(),
            rows,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the row set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Convert every row into a [`Record`] sharing this set's column names.
    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|values| Record::new(Arc::clone(&columns), values))
            .collect()
    }
}

/// A single row addressable by field name.
///
/// Column names are shared between all records of one result.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record from shared column names and positional values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Build a record from `(field, value)` pairs.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    /// Get a field value by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == field)
            .map(|i| &self.values[i])
    }

    /// Get a field as a string, treating NULL and empty strings as absent.
    pub fn get_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Value::to_non_empty_string)
    }

    /// Get a field as an i64.
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    /// Get a field as a bool.
    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(field, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Keep only the named fields, in the order given.
    ///
    /// Names that are not columns of this record are skipped.
    pub fn project(&self, fields: &[String]) -> Record {
        Record::from_pairs(
            fields
                .iter()
                .filter_map(|f| self.get(f).map(|v| (f.clone(), v.clone()))),
        )
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in self.iter() {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RowSet {
        RowSet::new(
            vec!["id".into(), "isolate".into(), "country".into()],
            vec![
                vec![Value::Int64(1), "A".into(), "UK".into()],
                vec![Value::Int64(2), "B".into(), Value::Null],
            ],
        )
    }

    #[test]
    fn test_records_share_columns() {
        let records = sample().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("isolate"), Some(&Value::from("A")));
        assert_eq!(records[1].get_i64("id"), Some(2));
        assert_eq!(records[1].get_string("country"), None);
        assert_eq!(records[1].get("missing"), None);
    }

    #[test]
    fn test_project() {
        let record = sample().into_records().remove(0);
        let projected = record.project(&["country".into(), "id".into(), "nope".into()]);
        assert_eq!(projected.columns(), &["country".to_string(), "id".to_string()]);
        assert_eq!(projected.values(), &[Value::from("UK"), Value::Int64(1)]);
    }

    #[test]
    fn test_record_serializes_as_object() {
        let record = Record::from_pairs([("id", Value::Int64(5)), ("name", "x".into())]);
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"id":5,"name":"x"}"#
        );
    }
}
