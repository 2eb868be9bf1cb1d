//! leaseq-core
//!
//! A persistent, lease-based message queue on top of a shared transactional
//! store. Producers and consumers in any number of processes share one
//! table; there is no broker.
//!
//! Delivery is at-least-once. A received message is leased, not removed:
//! the consumer deletes it with `ack` once processing succeeded. If the
//! consumer dies first, the lease expires and the message is handed out
//! again. Consumers must tolerate duplicates.
//!
//! # Modules
//! - **app**: `WorkerGroup` polling consumers
//! - **domain**: ids, messages, counts, errors
//! - **ports**: the `Store` / `Transaction` contract a backing store fulfils
//! - **impls**: `SqliteStore`
//! - **queue**: schema, lease manager, `Queue` handle, scoped reads
//! - **config**: `QueueConfig`, `StoreConfig`, `WorkerConfig`

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use config::{QueueConfig, StoreConfig, WorkerConfig};
pub use domain::{Delivery, Message, MessageId, QueueCounts, QueueError, ScopedError, StoreError};
pub use app::{MessageHandler, WorkerGroup};
pub use impls::SqliteStore;
pub use ports::{Dialect, Store, Transaction};
pub use queue::{Drain, LeaseGuard, LeaseManager, Queue};
