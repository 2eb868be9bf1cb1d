//! Impls - port implementations.
//!
//! - **SqliteStore**: `Store` over a rusqlite connection. Several processes
//!   may open the same database file.

pub mod sqlite_store;

pub use self::sqlite_store::SqliteStore;
