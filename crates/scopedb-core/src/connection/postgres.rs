//! PostgreSQL connections.
//!
//! Enable with `--features postgres`. The engine is synchronous, so each
//! connection drives its sqlx session on a private current-thread runtime.

use scopedb_proto::{RowSet, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, Connection as _, Executor, PgConnection, Postgres, Row, Statement, TypeInfo};
use tokio::runtime::{Builder, Runtime};

use super::{Connection, ConnectionParams, Connector, Dialect, DriverError};

impl From<sqlx::Error> for DriverError {
    fn from(e: sqlx::Error) -> Self {
        DriverError(e.to_string())
    }
}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError(e.to_string())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int64(i) => query.bind(*i),
            Value::Float64(f) => query.bind(*f),
            Value::String(s) => query.bind(s.clone()),
            Value::Bytes(b) => query.bind(b.clone()),
        };
    }
    query
}

fn read_value(row: &PgRow, index: usize) -> Result<Value, DriverError> {
    let column = &row.columns()[index];
    let value = match column.type_info().name() {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(|v| Value::Int64(i64::from(v))),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(|v| Value::Int64(i64::from(v))),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int64),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(|v| Value::Float64(f64::from(v))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float64),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::String)
        }
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Value::Bytes),
        "NUMERIC" => row
            .try_get::<Option<Decimal>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|v| Value::String(v.to_rfc3339())),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        "JSON" | "JSONB" => row
            .try_get::<Option<JsonValue>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        other => {
            return Err(DriverError(format!(
                "unsupported column type {} for column '{}'; cast it to text",
                other,
                column.name()
            )))
        }
    };
    Ok(value.unwrap_or(Value::Null))
}

/// A session on a PostgreSQL database.
pub struct PostgresConnection {
    runtime: Runtime,
    conn: PgConnection,
    label: String,
    in_transaction: bool,
}

impl PostgresConnection {
    /// Connect with the given parameters.
    pub fn connect(params: &ConnectionParams) -> Result<Self, DriverError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;

        let mut options = PgConnectOptions::new().database(&params.dbase_name);
        if let Some(host) = &params.host {
            options = options.host(host);
        }
        if let Some(port) = params.port {
            options = options.port(port);
        }
        if let Some(user) = &params.user {
            options = options.username(user);
        }
        if let Some(password) = &params.password {
            options = options.password(password);
        }

        let conn = runtime.block_on(PgConnection::connect_with(&options))?;
        let label = format!(
            "{}@{}",
            params.dbase_name,
            params.host.as_deref().unwrap_or("localhost")
        );

        Ok(Self {
            runtime,
            conn,
            label,
            in_transaction: false,
        })
    }

    fn raw(&mut self, sql: &str) -> Result<(), DriverError> {
        self.runtime
            .block_on(sqlx::raw_sql(sql).execute(&mut self.conn))?;
        Ok(())
    }
}

impl Connection for PostgresConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, DriverError> {
        let query = bind_all(sqlx::query(sql), params);
        let rows = self.runtime.block_on(query.fetch_all(&mut self.conn))?;

        // An empty result still has columns; take them from the statement.
        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                let statement = self.runtime.block_on((&mut self.conn).prepare(sql))?;
                statement
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(read_value(row, i)?);
            }
            out.push(values);
        }

        Ok(RowSet::new(columns, out))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, DriverError> {
        let query = bind_all(sqlx::query(sql), params);
        let done = self.runtime.block_on(query.execute(&mut self.conn))?;
        Ok(usize::try_from(done.rows_affected()).unwrap_or(usize::MAX))
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.raw("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.raw("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.raw("ROLLBACK")?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

/// Opens PostgreSQL sessions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl Connector for PostgresConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>, DriverError> {
        Ok(Box::new(PostgresConnection::connect(params)?))
    }
}

#[cfg(test)]
mod tests {
    //! Requires a running PostgreSQL server; connection settings come from
    //! the standard `PGHOST`, `PGUSER`, `PGPASSWORD` and `PGDATABASE`
    //! environment variables.

    use scopedb_proto::{FetchMode, QueryOptions};

    use super::*;
    use crate::query::QueryExecutor;

    fn connect() -> PostgresConnection {
        let database = std::env::var("PGDATABASE").unwrap_or_else(|_| "postgres".to_string());
        PostgresConnection::connect(&ConnectionParams::new(database)).unwrap()
    }

    #[test]
    #[ignore = "requires a PostgreSQL server"]
    fn test_empty_result_keeps_columns() {
        let mut conn = connect();
        let keyed = QueryExecutor::new(&mut conn)
            .execute(
                "SELECT 1::int8 AS id, 'x'::text AS name WHERE 1=?",
                2,
                FetchMode::KeyedByField,
                &QueryOptions::new().with_key("id"),
            )
            .unwrap()
            .into_keyed();
        assert!(keyed.is_empty());
    }

    #[test]
    #[ignore = "requires a PostgreSQL server"]
    fn test_temporal_and_numeric_columns() {
        let mut conn = connect();
        let row = QueryExecutor::new(&mut conn)
            .fetch_row(
                "SELECT DATE '2026-12-24' AS absent_until, 12.50::numeric AS mic, \
                 TIMESTAMP '2026-01-02 03:04:05' AS datestamp, NULL::date AS missing",
                (),
            )
            .unwrap()
            .unwrap();
        assert_eq!(row.get_string("absent_until").as_deref(), Some("2026-12-24"));
        assert_eq!(row.get_string("mic").as_deref(), Some("12.50"));
        assert_eq!(row.get_string("datestamp").as_deref(), Some("2026-01-02 03:04:05"));
        assert!(row.get("missing").unwrap().is_null());
    }
}
