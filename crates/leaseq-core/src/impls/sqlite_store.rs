//! SqliteStore - `Store` backed by one rusqlite connection.
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Every transaction starts with
//! `BEGIN IMMEDIATE`, which takes the database write lock up front, so a
//! competing leaser blocks (up to `busy_timeout`) before it can even run
//! its candidate select. Independent consumers open independent stores on
//! the same file; one store serializes its own callers behind a mutex.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::domain::errors::StoreError;
use crate::ports::store::{Dialect, Row, Store, Transaction, Value};

static SQLITE_DIALECT: Dialect = Dialect::sqlite();

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::backend("open", e))?;
        conn.busy_timeout(config.busy_timeout())
            .map_err(|e| StoreError::backend("configure", e))?;

        if config.wal {
            let mode: String = conn
                .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
                .map_err(|e| StoreError::backend("configure", e))?;
            debug!(path = %path.display(), journal_mode = %mode, "opened sqlite store");
        }

        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database. Only this store can see it, so it suits
    /// single-handle use and tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::backend("open", e))?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Store for SqliteStore {
    fn dialect(&self) -> &Dialect {
        &SQLITE_DIALECT
    }

    fn transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StoreError::backend("begin", e))?;
        Ok(Box::new(SqliteTransaction { conn, open: true }))
    }
}

struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    open: bool,
}

impl Transaction for SqliteTransaction<'_> {
    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, StoreError> {
        let changed = self
            .conn
            .execute(sql, params_from_iter(args.iter()))
            .map_err(|e| StoreError::backend("execute", e))?;
        Ok(changed as u64)
    }

    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| StoreError::backend("prepare", e))?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(args.iter()))
            .map_err(|e| StoreError::backend("query", e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| StoreError::backend("query", e))? {
            let mut columns = Vec::with_capacity(width);
            for index in 0..width {
                let value: SqlValue = row
                    .get(index)
                    .map_err(|e| StoreError::backend("query", e))?;
                columns.push(from_sqlite(value));
            }
            out.push(Row(columns));
        }
        Ok(out)
    }

    fn last_insert_id(&mut self) -> Result<i64, StoreError> {
        Ok(self.conn.last_insert_rowid())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        // On failure `open` stays set and Drop rolls back.
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| StoreError::backend("commit", e))?;
        self.open = false;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "sqlite rollback failed");
            }
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            Value::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v)),
        })
    }
}

fn from_sqlite(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(v),
        SqlValue::Real(v) => Value::Real(v),
        SqlValue::Text(v) => Value::Text(v),
        SqlValue::Blob(v) => Value::Blob(v),
    }
}
