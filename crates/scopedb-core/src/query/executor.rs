//! The query executor.

use scopedb_proto::{FetchMode, KeyedRecords, Params, QueryOptions, QueryResult, Record, RowSet, Value};

use super::sql::{count_placeholders, rewrite_placeholders};
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Runs portable statements against one connection.
///
/// Backend rejections are returned as [`Error::QueryFailed`] carrying the
/// statement as written by the caller. An error is never reported as an
/// empty result.
pub struct QueryExecutor<'c> {
    conn: &'c mut dyn Connection,
}

impl<'c> QueryExecutor<'c> {
    /// Create an executor over a connection.
    pub fn new(conn: &'c mut dyn Connection) -> Self {
        Self { conn }
    }

    /// Run a statement and reshape the rows.
    pub fn execute(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        mode: FetchMode,
        options: &QueryOptions,
    ) -> Result<QueryResult> {
        let rows = self.query(sql, params.into())?;
        QueryResult::shape(rows, mode, options).map_err(|e| {
            tracing::warn!(statement = sql, error = %e, "cannot reshape result");
            Error::from(e)
        })
    }

    /// Run a statement that returns no rows (DDL or DML).
    ///
    /// Returns the affected row count. The caller commits.
    pub fn execute_statement(&mut self, sql: &str, params: impl Into<Params>) -> Result<usize> {
        let params = params.into();
        let native = self.prepare(sql, &params)?;
        tracing::debug!(connection = self.conn.label(), statement = sql, "execute");
        self.conn
            .execute(&native, params.as_slice())
            .map_err(|e| self.fail(sql, e))
    }

    /// First row, or `None` when the statement returns no rows.
    pub fn fetch_row(&mut self, sql: &str, params: impl Into<Params>) -> Result<Option<Record>> {
        Ok(self
            .execute(sql, params, FetchMode::SingleRow, &QueryOptions::default())?
            .into_row())
    }

    /// First column of every row.
    pub fn fetch_column(&mut self, sql: &str, params: impl Into<Params>) -> Result<Vec<Value>> {
        Ok(self
            .execute(sql, params, FetchMode::Column, &QueryOptions::default())?
            .into_column())
    }

    /// Every row as a record, projected onto `options.fields` when given.
    pub fn fetch_records(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        options: &QueryOptions,
    ) -> Result<Vec<Record>> {
        Ok(self
            .execute(sql, params, FetchMode::Records, options)?
            .into_records())
    }

    /// Every row as a record, indexed by the value of `key`.
    pub fn fetch_keyed(
        &mut self,
        sql: &str,
        params: impl Into<Params>,
        key: &str,
    ) -> Result<KeyedRecords> {
        let options = QueryOptions::new().with_key(key);
        Ok(self
            .execute(sql, params, FetchMode::KeyedByField, &options)?
            .into_keyed())
    }

    /// Truth value of the first column of the first row.
    ///
    /// Meant for `SELECT EXISTS(...)` checks; no rows reads as false.
    pub fn fetch_exists(&mut self, sql: &str, params: impl Into<Params>) -> Result<bool> {
        let first = self.fetch_column(sql, params)?.into_iter().next();
        Ok(first.and_then(|v| v.as_bool()).unwrap_or(false))
    }

    fn query(&mut self, sql: &str, params: Params) -> Result<RowSet> {
        let native = self.prepare(sql, &params)?;
        tracing::debug!(
            connection = self.conn.label(),
            statement = sql,
            params = params.len(),
            "query"
        );
        self.conn
            .query(&native, params.as_slice())
            .map_err(|e| self.fail(sql, e))
    }

    fn prepare(&self, sql: &str, params: &Params) -> Result<String> {
        let expected = count_placeholders(sql);
        if expected != params.len() {
            let message = format!(
                "statement has {} placeholders but {} values were bound",
                expected,
                params.len()
            );
            tracing::error!(statement = sql, "{}", message);
            return Err(Error::query_failed(sql, message));
        }
        Ok(rewrite_placeholders(sql, self.conn.dialect()))
    }

    fn fail(&self, sql: &str, e: impl std::fmt::Display) -> Error {
        tracing::error!(connection = self.conn.label(), statement = sql, error = %e, "query failed");
        Error::query_failed(sql, e)
    }
}

/// Run a statement on a connection and reshape the rows.
pub fn execute(
    conn: &mut dyn Connection,
    sql: &str,
    params: impl Into<Params>,
    mode: FetchMode,
    options: &QueryOptions,
) -> Result<QueryResult> {
    QueryExecutor::new(conn).execute(sql, params, mode, options)
}
