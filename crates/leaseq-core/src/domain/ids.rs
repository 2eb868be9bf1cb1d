//! Message identifiers.
//!
//! The store assigns ids (autoincrement primary key), so unlike a
//! client-generated id there is no constructor that invents one. The value
//! is the only handle used to ack or change the lease of a message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned id of one message record.
///
/// Ids are monotonic per table. Gaps are possible (rolled back inserts,
/// acked messages) and must not be relied on.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    /// Display prefix, e.g. `msg-42`.
    pub const PREFIX: &'static str = "msg-";

    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self::from_raw(value)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}
