//! Lease manager: claim, renew/expire and release over the schema.
//!
//! Every operation is one store transaction. Nothing is cached between
//! calls, so any number of managers (in any number of processes) may share
//! one table.
//!
//! A claim is a time-bounded promise, not a removal. The record stays in
//! the table until `ack`; if the holder dies, the lease runs out and the
//! next `lease` call picks the record up again. Expiry is evaluated lazily
//! by that call, against the store's clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::schema::Schema;
use crate::domain::counts::QueueCounts;
use crate::domain::errors::QueueError;
use crate::domain::ids::MessageId;
use crate::domain::message::Message;
use crate::ports::store::{Store, Value};

pub struct LeaseManager {
    store: Arc<dyn Store>,
    schema: Schema,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let schema = Schema::new(store.dialect());
        Self { store, schema }
    }

    /// Create the table and its queue index if missing.
    pub fn create_table(&self) -> Result<(), QueueError> {
        let mut tx = self.store.transaction()?;
        tx.execute(&self.schema.create_table, &[])?;
        tx.execute(&self.schema.create_index, &[])?;
        tx.commit()?;
        Ok(())
    }

    /// Drop the table, and with it every queue stored in it.
    pub fn drop_table(&self) -> Result<(), QueueError> {
        let mut tx = self.store.transaction()?;
        tx.execute(&self.schema.drop_table, &[])?;
        tx.commit()?;
        Ok(())
    }

    /// Insert an unlocked record. `lease` is truncated to whole seconds.
    pub fn send(&self, queue: &str, payload: &[u8], lease: Duration) -> Result<MessageId, QueueError> {
        let mut tx = self.store.transaction()?;
        tx.execute(
            &self.schema.insert,
            &[
                Value::from(queue),
                Value::Blob(payload.to_vec()),
                Value::Integer(seconds(lease)),
            ],
        )?;
        let id = MessageId::from_raw(tx.last_insert_id()?);
        tx.commit()?;

        debug!(queue, %id, lease_secs = seconds(lease), "sent message");
        Ok(id)
    }

    /// Claim the lowest-id record that is unlocked or whose lease expired.
    ///
    /// The candidate select and the claim run in the same transaction, and
    /// the select holds the dialect's row lock, so two leasers never both
    /// win one record.
    pub fn lease(&self, queue: &str) -> Result<Message, QueueError> {
        let mut tx = self.store.transaction()?;
        let rows = tx.query(&self.schema.select_candidate, &[Value::from(queue)])?;
        let Some(row) = rows.first() else {
            return Err(QueueError::empty(queue));
        };

        let id = MessageId::from_raw(row.integer(0)?);
        let payload = row.bytes(1)?;
        let created_at = from_millis(row.integer(2)?)?;

        tx.execute(&self.schema.claim, &[Value::Integer(id.as_i64())])?;
        tx.commit()?;

        debug!(queue, %id, "leased message");
        Ok(Message {
            id,
            payload,
            created_at,
        })
    }

    /// Delete a record. Deleting an absent id is a no-op: another consumer
    /// may have finished the same message first.
    pub fn ack(&self, id: MessageId) -> Result<(), QueueError> {
        let mut tx = self.store.transaction()?;
        let deleted = tx.execute(&self.schema.delete, &[Value::Integer(id.as_i64())])?;
        tx.commit()?;

        debug!(%id, deleted, "acked message");
        Ok(())
    }

    /// Move the lease expiry to `now + lease`. A zero lease releases the
    /// record for immediate re-lease. Absent ids are a no-op.
    pub fn change_lease(&self, id: MessageId, lease: Duration) -> Result<(), QueueError> {
        let mut tx = self.store.transaction()?;
        let changed = tx.execute(
            &self.schema.change_lease,
            &[Value::Integer(seconds(lease)), Value::Integer(id.as_i64())],
        )?;
        tx.commit()?;

        debug!(%id, lease_secs = seconds(lease), changed, "changed lease");
        Ok(())
    }

    pub fn counts(&self, queue: &str) -> Result<QueueCounts, QueueError> {
        let mut tx = self.store.transaction()?;
        let rows = tx.query(&self.schema.counts, &[Value::from(queue)])?;
        tx.commit()?;

        let row = rows
            .first()
            .ok_or_else(|| QueueError::InvalidRecord("counts returned no row".to_string()))?;
        Ok(QueueCounts {
            pending: count(row.integer(0)?),
            leased: count(row.integer(1)?),
            stale: count(row.integer(2)?),
        })
    }

    /// Delete every record of one queue, leased or not.
    pub fn purge(&self, queue: &str) -> Result<u64, QueueError> {
        let mut tx = self.store.transaction()?;
        let deleted = tx.execute(&self.schema.purge, &[Value::from(queue)])?;
        tx.commit()?;

        debug!(queue, deleted, "purged queue");
        Ok(deleted)
    }
}

fn seconds(lease: Duration) -> i64 {
    i64::try_from(lease.as_secs()).unwrap_or(i64::MAX / 1000)
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, QueueError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| QueueError::InvalidRecord(format!("timestamp out of range: {millis}")))
}
