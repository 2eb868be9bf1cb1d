//! Record store schema: the `message_queue` table and every statement the
//! queue runs against it.
//!
//! One table holds all queues, partitioned by the `queue` column. Columns:
//! - `id`: autoincrement key, never reused; the lease handle
//! - `payload`: opaque bytes
//! - `created_at`, `read_at`, `lease_expires_at`: store clock, Unix ms
//! - `lease_seconds`: lease length applied on every claim
//! - `locked`: set by the first claim, never cleared; a locked record is
//!   eligible again once `lease_expires_at` is reached

use crate::ports::store::Dialect;

pub const TABLE: &str = "message_queue";

/// Statements rendered for one dialect.
#[derive(Debug, Clone)]
pub struct Schema {
    pub create_table: String,
    pub create_index: String,
    pub drop_table: String,
    /// args: queue, payload, lease_seconds
    pub insert: String,
    /// args: queue. Returns id, payload, created_at of the lowest eligible id.
    pub select_candidate: String,
    /// args: id
    pub claim: String,
    /// args: id
    pub delete: String,
    /// args: seconds, id
    pub change_lease: String,
    /// args: queue. Returns pending, leased, stale.
    pub counts: String,
    /// args: queue
    pub purge: String,
}

impl Schema {
    pub fn new(dialect: &Dialect) -> Self {
        let now = dialect.now_millis;
        Self {
            create_table: format!(
                "CREATE TABLE IF NOT EXISTS {TABLE} (\
                 {id}, \
                 queue {text} NOT NULL, \
                 payload {blob}, \
                 created_at INTEGER NOT NULL, \
                 read_at INTEGER, \
                 lease_expires_at INTEGER, \
                 lease_seconds INTEGER NOT NULL, \
                 locked INTEGER NOT NULL DEFAULT 0)",
                id = dialect.id_column,
                text = dialect.text_type,
                blob = dialect.blob_type,
            ),
            create_index: format!(
                "CREATE INDEX IF NOT EXISTS {TABLE}_queue_index ON {TABLE} (queue)"
            ),
            drop_table: format!("DROP TABLE IF EXISTS {TABLE}"),
            insert: format!(
                "INSERT INTO {TABLE} (queue, payload, lease_seconds, created_at) \
                 VALUES (?1, ?2, ?3, {now})"
            ),
            select_candidate: format!(
                "SELECT id, payload, created_at FROM {TABLE} \
                 WHERE queue = ?1 AND (locked = 0 OR lease_expires_at <= {now}) \
                 ORDER BY id ASC LIMIT 1{lock}",
                lock = dialect.row_lock,
            ),
            claim: format!(
                "UPDATE {TABLE} SET locked = 1, read_at = {now}, \
                 lease_expires_at = {now} + lease_seconds * 1000 \
                 WHERE id = ?1"
            ),
            delete: format!("DELETE FROM {TABLE} WHERE id = ?1"),
            change_lease: format!(
                "UPDATE {TABLE} SET lease_expires_at = {now} + ?1 * 1000 WHERE id = ?2"
            ),
            counts: format!(
                "SELECT \
                 COALESCE(SUM(CASE WHEN locked = 0 THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN locked = 1 AND lease_expires_at > {now} THEN 1 ELSE 0 END), 0), \
                 COALESCE(SUM(CASE WHEN locked = 1 AND lease_expires_at <= {now} THEN 1 ELSE 0 END), 0) \
                 FROM {TABLE} WHERE queue = ?1"
            ),
            purge: format!("DELETE FROM {TABLE} WHERE queue = ?1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_select_orders_by_id_and_appends_row_lock() {
        let dialect = Dialect {
            row_lock: " FOR UPDATE",
            ..Dialect::sqlite()
        };
        let schema = Schema::new(&dialect);

        assert!(schema.select_candidate.contains("ORDER BY id ASC LIMIT 1 FOR UPDATE"));
        assert!(schema.select_candidate.contains("locked = 0 OR lease_expires_at <="));
    }

    #[test]
    fn sqlite_statements_use_store_clock() {
        let dialect = Dialect::sqlite();
        let schema = Schema::new(&dialect);

        for sql in [&schema.insert, &schema.claim, &schema.change_lease] {
            assert!(sql.contains(dialect.now_millis), "{sql}");
        }
        assert!(schema.select_candidate.ends_with("LIMIT 1"));
    }

    #[test]
    fn ddl_is_idempotent() {
        let schema = Schema::new(&Dialect::sqlite());
        assert!(schema.create_table.starts_with("CREATE TABLE IF NOT EXISTS message_queue"));
        assert!(schema.create_index.contains("IF NOT EXISTS"));
        assert_eq!(schema.drop_table, "DROP TABLE IF EXISTS message_queue");
    }
}
