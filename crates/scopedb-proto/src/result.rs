//! Fetch modes and the result shapes they produce.

use std::collections::HashMap;

use crate::error::Error;
use crate::record::{Record, RowSet};
use crate::value::Value;

/// Records indexed by the value of a key field.
pub type KeyedRecords = HashMap<Value, Record>;

/// How a row set is reshaped before it is returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// First row as a record, or none.
    #[default]
    SingleRow,
    /// First column of every row, flattened.
    Column,
    /// Every row as a record.
    Records,
    /// Every row as a record, indexed by a key field.
    KeyedByField,
}

/// Per-call options for [`FetchMode::Records`] and [`FetchMode::KeyedByField`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Key field for [`FetchMode::KeyedByField`].
    pub key: Option<String>,
    /// Field allow-list for [`FetchMode::Records`]. Empty means all fields.
    pub fields: Vec<String>,
}

impl QueryOptions {
    /// Options with no key and no projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key field.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set the field allow-list.
    pub fn with_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// A reshaped query result.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Result of [`FetchMode::SingleRow`].
    Row(Option<Record>),
    /// Result of [`FetchMode::Column`].
    Column(Vec<Value>),
    /// Result of [`FetchMode::Records`].
    Records(Vec<Record>),
    /// Result of [`FetchMode::KeyedByField`].
    Keyed(KeyedRecords),
}

impl QueryResult {
    /// Reshape a row set according to the fetch mode.
    pub fn shape(rows: RowSet, mode: FetchMode, options: &QueryOptions) -> Result<Self, Error> {
        match mode {
            FetchMode::SingleRow => Ok(QueryResult::Row(rows.into_records().into_iter().next())),
            FetchMode::Column => Ok(QueryResult::Column(
                rows.rows
                    .into_iter()
                    .filter_map(|row| row.into_iter().next())
                    .collect(),
            )),
            FetchMode::Records => {
                let records = rows.into_records();
                if options.fields.is_empty() {
                    Ok(QueryResult::Records(records))
                } else {
                    Ok(QueryResult::Records(
                        records.iter().map(|r| r.project(&options.fields)).collect(),
                    ))
                }
            }
            FetchMode::KeyedByField => {
                let key = options.key.as_deref().ok_or(Error::MissingKeyField)?;
                let index = rows
                    .column_index(key)
                    .ok_or_else(|| Error::KeyFieldNotInResult(key.to_string()))?;
                let mut keyed = KeyedRecords::with_capacity(rows.len());
                for record in rows.into_records() {
                    let value = record.values()[index].clone();
                    if keyed.contains_key(&value) {
                        return Err(Error::DuplicateKey {
                            field: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                    keyed.insert(value, record);
                }
                Ok(QueryResult::Keyed(keyed))
            }
        }
    }

    /// Take the single-row result.
    pub fn into_row(self) -> Option<Record> {
        match self {
            QueryResult::Row(row) => row,
            QueryResult::Records(records) => records.into_iter().next(),
            _ => None,
        }
    }

    /// Take the column result.
    pub fn into_column(self) -> Vec<Value> {
        match self {
            QueryResult::Column(values) => values,
            _ => Vec::new(),
        }
    }

    /// Take the records result.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            QueryResult::Records(records) => records,
            QueryResult::Row(row) => row.into_iter().collect(),
            QueryResult::Keyed(keyed) => keyed.into_values().collect(),
            QueryResult::Column(_) => Vec::new(),
        }
    }

    /// Take the keyed result.
    pub fn into_keyed(self) -> KeyedRecords {
        match self {
            QueryResult::Keyed(keyed) => keyed,
            _ => KeyedRecords::new(),
        }
    }
}
