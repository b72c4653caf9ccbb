//! SQLite connections.

use std::path::{Path, PathBuf};

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection as RawConnection};
use scopedb_proto::{RowSet, Value};

use super::{Connection, ConnectionParams, Connector, Dialect, DriverError};

/// Database name that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

impl From<rusqlite::Error> for DriverError {
    fn from(e: rusqlite::Error) -> Self {
        DriverError(e.to_string())
    }
}

/// Borrowing adapter that binds a [`Value`] as an SQLite parameter.
struct Bind<'a>(&'a Value);

impl ToSql for Bind<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Value::Int64(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Float64(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::String(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// A session on an SQLite database.
pub struct SqliteConnection {
    conn: RawConnection,
    label: String,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let conn = RawConnection::open(path)?;
        Ok(Self::from_raw(conn, path.display().to_string()))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DriverError> {
        let conn = RawConnection::open_in_memory()?;
        Ok(Self::from_raw(conn, IN_MEMORY))
    }

    /// Wrap an existing rusqlite connection.
    pub fn from_raw(conn: RawConnection, label: impl Into<String>) -> Self {
        Self {
            conn,
            label: label.into(),
            in_transaction: false,
        }
    }

    /// Run a batch of `;`-separated statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DriverError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<RowSet, DriverError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter().map(Bind)))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(read_value(row.get_ref(i)?));
            }
            out.push(values);
        }

        Ok(RowSet::new(columns, out))
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize, DriverError> {
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.execute(params_from_iter(params.iter().map(Bind)))?)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.conn.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

/// Opens SQLite databases by name.
///
/// Relative database names resolve against the connector's data directory.
#[derive(Debug, Clone, Default)]
pub struct SqliteConnector {
    data_dir: Option<PathBuf>,
}

impl SqliteConnector {
    /// Resolve database names against the working directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve database names against `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
        }
    }

    /// File path a database name resolves to.
    pub fn resolve(&self, dbase_name: &str) -> PathBuf {
        match &self.data_dir {
            Some(dir) if Path::new(dbase_name).is_relative() => dir.join(dbase_name),
            _ => PathBuf::from(dbase_name),
        }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self, params: &ConnectionParams) -> Result<Box<dyn Connection>, DriverError> {
        if params.dbase_name == IN_MEMORY {
            return Ok(Box::new(SqliteConnection::open_in_memory()?));
        }
        let path = self.resolve(&params.dbase_name);
        tracing::debug!(path = %path.display(), "opening sqlite database");
        Ok(Box::new(SqliteConnection::open(path)?))
    }
}
