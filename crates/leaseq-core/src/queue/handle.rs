//! Queue handle: one named queue over a shared lease manager.
//!
//! Store calls block (they may wait on another consumer's transaction), so
//! each one runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use super::lease::LeaseManager;
use crate::config::QueueConfig;
use crate::domain::counts::QueueCounts;
use crate::domain::errors::{QueueError, StoreError};
use crate::domain::ids::MessageId;
use crate::domain::message::Message;
use crate::ports::store::Store;

/// Handle bound to one queue name. Cheap to clone; clones share the store.
///
/// # Usage
/// ```ignore
/// let store: Arc<dyn Store> = Arc::new(SqliteStore::open("queue.db", &StoreConfig::default())?);
/// let queue = Queue::open("emails", store, QueueConfig::default()).await?;
/// queue.send("hello").await?;
/// let message = queue.receive().await?;
/// // ... process ...
/// queue.ack(message.id).await?;
/// ```
#[derive(Clone)]
pub struct Queue {
    name: Arc<str>,
    leases: Arc<LeaseManager>,
    default_lease: Duration,
}

impl Queue {
    /// Bind a handle without touching the store.
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>, config: &QueueConfig) -> Self {
        Self {
            name: Arc::from(name.into()),
            leases: Arc::new(LeaseManager::new(store)),
            default_lease: config.default_lease(),
        }
    }

    /// Bind a handle, then apply the config's drop/create flags (drop first).
    pub async fn open(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        config: QueueConfig,
    ) -> Result<Self, QueueError> {
        let queue = Self::new(name, store, &config);
        if config.drop_on_open {
            queue.drop_table().await?;
        }
        if config.create_on_open {
            queue.create_table().await?;
        }
        Ok(queue)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_lease(&self) -> Duration {
        self.default_lease
    }

    /// Send with the queue's default lease.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> Result<MessageId, QueueError> {
        self.send_with_lease(payload, self.default_lease).await
    }

    /// Send with an explicit lease. It must outlast the consumer's
    /// processing time, or the message can be delivered twice.
    pub async fn send_with_lease(
        &self,
        payload: impl Into<Vec<u8>>,
        lease: Duration,
    ) -> Result<MessageId, QueueError> {
        let name = Arc::clone(&self.name);
        let payload = payload.into();
        self.blocking(move |leases| leases.send(&name, &payload, lease))
            .await
    }

    /// Serialize `value` as JSON and send it. Read it back with `Message::decode`.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<MessageId, QueueError> {
        let payload = serde_json::to_vec(value)?;
        self.send(payload).await
    }

    /// Lease the oldest eligible message, or fail with `EmptyQueue`.
    ///
    /// The caller owns the lease from here on. If this future is dropped
    /// while the lease is being taken, the message stays leased until it
    /// expires; use the scoped reads for release on cancellation.
    pub async fn receive(&self) -> Result<Message, QueueError> {
        let name = Arc::clone(&self.name);
        self.blocking(move |leases| leases.lease(&name)).await
    }

    /// Delete a message for good.
    pub async fn ack(&self, id: MessageId) -> Result<(), QueueError> {
        self.blocking(move |leases| leases.ack(id)).await
    }

    /// Give a message back for immediate re-lease.
    pub async fn nack(&self, id: MessageId) -> Result<(), QueueError> {
        self.change_lease(id, Duration::ZERO).await
    }

    /// Extend (or shorten) the lease on a message, counted from now.
    pub async fn change_lease(&self, id: MessageId, lease: Duration) -> Result<(), QueueError> {
        self.blocking(move |leases| leases.change_lease(id, lease))
            .await
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let name = Arc::clone(&self.name);
        self.blocking(move |leases| leases.counts(&name)).await
    }

    /// Delete every message of this queue. Other queues are untouched.
    pub async fn purge(&self) -> Result<u64, QueueError> {
        let name = Arc::clone(&self.name);
        self.blocking(move |leases| leases.purge(&name)).await
    }

    /// Create the shared table if missing.
    pub async fn create_table(&self) -> Result<(), QueueError> {
        self.blocking(|leases| leases.create_table()).await
    }

    /// Drop the shared table if present. This removes every queue in it.
    pub async fn drop_table(&self) -> Result<(), QueueError> {
        info!(queue = %self.name, "dropping message table");
        self.blocking(|leases| leases.drop_table()).await
    }

    /// Drop and recreate the shared table.
    pub async fn reset(&self) -> Result<(), QueueError> {
        self.drop_table().await?;
        self.create_table().await
    }

    pub(crate) fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    pub(super) async fn blocking<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        T: Send + 'static,
        F: FnOnce(&LeaseManager) -> Result<T, QueueError> + Send + 'static,
    {
        let leases = Arc::clone(&self.leases);
        tokio::task::spawn_blocking(move || f(&leases))
            .await
            .map_err(|e| StoreError::TaskAborted(e.to_string()))?
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("default_lease", &self.default_lease)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::sqlite_store::SqliteStore;
    use serde::Deserialize;

    async fn queue(name: &str) -> Queue {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        Queue::open(name, store, QueueConfig::default()).await.unwrap()
    }

    #[tokio::test]
    async fn send_receive_ack_scenario() {
        let q = queue("q").await;
        let a = q.send("a").await.unwrap();
        let b = q.send("b").await.unwrap();

        let first = q.receive().await.unwrap();
        assert_eq!(first.id, a);
        assert_eq!(first.as_str(), Some("a"));
        q.ack(first.id).await.unwrap();

        let second = q.receive().await.unwrap();
        assert_eq!(second.id, b);
        q.ack(second.id).await.unwrap();

        let err = q.receive().await.unwrap_err();
        assert!(matches!(err, QueueError::EmptyQueue { ref queue } if queue == "q"));
    }

    #[tokio::test]
    async fn nack_makes_message_available_again() {
        let q = queue("q").await;
        let id = q.send("a").await.unwrap();

        let leased = q.receive().await.unwrap();
        assert!(q.receive().await.unwrap_err().is_empty_queue());

        q.nack(leased.id).await.unwrap();
        assert_eq!(q.receive().await.unwrap().id, id);
    }

    #[tokio::test]
    async fn ack_twice_is_a_no_op() {
        let q = queue("q").await;
        let id = q.send("a").await.unwrap();
        q.ack(id).await.unwrap();
        q.ack(id).await.unwrap();
        q.nack(id).await.unwrap();
    }

    #[tokio::test]
    async fn per_send_lease_overrides_default() {
        let q = queue("q").await;
        let id = q.send_with_lease("short", Duration::ZERO).await.unwrap();

        assert_eq!(q.receive().await.unwrap().id, id);
        // Lease already over: delivered again.
        assert_eq!(q.receive().await.unwrap().id, id);
        assert_eq!(q.counts().await.unwrap().stale, 1);
    }

    #[tokio::test]
    async fn json_payloads_round_trip_through_the_queue() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Job {
            user: String,
            attempt: u32,
        }

        let q = queue("jobs").await;
        let job = Job {
            user: "ada".into(),
            attempt: 1,
        };
        q.send_json(&job).await.unwrap();

        let message = q.receive().await.unwrap();
        assert_eq!(message.decode::<Job>().unwrap(), job);
    }

    #[tokio::test]
    async fn reset_clears_every_queue() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let left = Queue::open("left", Arc::clone(&store), QueueConfig::default())
            .await
            .unwrap();
        let right = Queue::new("right", store, &QueueConfig::default());
        left.send("l").await.unwrap();
        right.send("r").await.unwrap();

        left.reset().await.unwrap();

        assert_eq!(left.counts().await.unwrap().total(), 0);
        assert_eq!(right.counts().await.unwrap().total(), 0);
    }

    #[tokio::test]
    async fn drop_on_open_discards_existing_messages() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let first = Queue::open("q", Arc::clone(&store), QueueConfig::default())
            .await
            .unwrap();
        first.send("old").await.unwrap();

        let config = QueueConfig {
            drop_on_open: true,
            ..QueueConfig::default()
        };
        let second = Queue::open("q", store, config).await.unwrap();

        assert!(second.receive().await.unwrap_err().is_empty_queue());
    }

    #[tokio::test]
    async fn drop_table_then_create_table_starts_empty() {
        let q = queue("q").await;
        q.send("a").await.unwrap();

        q.drop_table().await.unwrap();
        assert!(q.receive().await.is_err());

        q.create_table().await.unwrap();
        q.create_table().await.unwrap();
        assert!(q.receive().await.unwrap_err().is_empty_queue());
    }

    #[tokio::test]
    async fn without_create_operations_report_store_failure() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = QueueConfig {
            create_on_open: false,
            ..QueueConfig::default()
        };
        let q = Queue::open("q", store, config).await.unwrap();

        let err = q.receive().await.unwrap_err();
        assert!(matches!(err, QueueError::Store(StoreError::Backend { .. })));
    }
}
