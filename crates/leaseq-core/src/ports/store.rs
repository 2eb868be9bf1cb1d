//! Store port: the transactional store the queue runs on.
//!
//! The queue owns no connection handling and no database. It needs exactly
//! three things from a store:
//! - a transaction scope that commits explicitly and rolls back otherwise
//! - `execute` / `query` with positional arguments inside that scope
//! - row exclusion on the lease candidate select, and server-side "now"
//!
//! The last point is expressed by `Dialect`, so the same statements work on
//! any store that can fill it in.

use crate::domain::errors::{QueueError, StoreError};

/// Argument or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    fn column(&self, index: usize) -> Result<&Value, QueueError> {
        self.0
            .get(index)
            .ok_or_else(|| QueueError::InvalidRecord(format!("missing column {index}")))
    }

    pub fn integer(&self, index: usize) -> Result<i64, QueueError> {
        match self.column(index)? {
            Value::Integer(value) => Ok(*value),
            other => Err(QueueError::InvalidRecord(format!(
                "column {index}: expected integer, got {other:?}"
            ))),
        }
    }

    /// Blob column; text is accepted as its UTF-8 bytes and NULL as empty.
    pub fn bytes(&self, index: usize) -> Result<Vec<u8>, QueueError> {
        match self.column(index)? {
            Value::Blob(bytes) => Ok(bytes.clone()),
            Value::Text(text) => Ok(text.clone().into_bytes()),
            Value::Null => Ok(Vec::new()),
            other => Err(QueueError::InvalidRecord(format!(
                "column {index}: expected blob, got {other:?}"
            ))),
        }
    }
}

/// Statement fragments that differ between stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Expression evaluating to the store's current time in Unix milliseconds.
    pub now_millis: &'static str,
    /// Suffix on the lease candidate select that locks the selected row
    /// (` FOR UPDATE`). Empty when the transaction itself already excludes
    /// other writers.
    pub row_lock: &'static str,
    /// Column definition of an autoincrementing, never-reused primary key.
    pub id_column: &'static str,
    pub blob_type: &'static str,
    pub text_type: &'static str,
}

impl Dialect {
    /// SQLite: millisecond clock from `julianday`, no row locks (the
    /// adapter starts transactions with `BEGIN IMMEDIATE` instead).
    pub const fn sqlite() -> Self {
        Self {
            now_millis: "CAST(ROUND((julianday('now') - 2440587.5) * 86400000.0) AS INTEGER)",
            row_lock: "",
            id_column: "id INTEGER PRIMARY KEY AUTOINCREMENT",
            blob_type: "BLOB",
            text_type: "TEXT",
        }
    }
}

/// An open transaction.
///
/// Dropping it without calling `commit` rolls it back.
pub trait Transaction {
    /// Run a statement, returning the number of rows it changed.
    fn execute(&mut self, sql: &str, args: &[Value]) -> Result<u64, StoreError>;

    fn query(&mut self, sql: &str, args: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Id generated by the most recent insert in this transaction.
    fn last_insert_id(&mut self) -> Result<i64, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// A transactional store shared by every queue handle built on it.
pub trait Store: Send + Sync {
    fn dialect(&self) -> &Dialect;

    /// Begin a transaction. May block while another transaction holds the
    /// lock it needs.
    fn transaction(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}
