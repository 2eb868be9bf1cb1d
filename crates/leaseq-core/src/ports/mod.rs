//! Ports - the seams to external systems.
//!
//! The only one is the transactional store. Connection acquisition, DDL
//! dialect and locking behaviour belong to its implementation.

pub mod store;

pub use self::store::{Dialect, Row, Store, Transaction, Value};
