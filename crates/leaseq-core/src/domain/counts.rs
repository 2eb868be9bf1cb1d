use serde::{Deserialize, Serialize};

/// Snapshot of one queue, evaluated against the store clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Never leased, or released without a lock.
    pub pending: u64,
    /// Locked with a lease that has not expired yet.
    pub leased: u64,
    /// Locked, but the lease expired; eligible for re-lease.
    pub stale: u64,
}

impl QueueCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.leased + self.stale
    }

    /// Records a `lease` call could return right now.
    pub fn eligible(&self) -> u64 {
        self.pending + self.stale
    }
}
