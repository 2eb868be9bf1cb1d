//! Error types.
//!
//! - `StoreError`: anything the transactional store reports. Not recovered
//!   here; the adapter rolls back the open transaction before it surfaces.
//! - `QueueError`: what queue operations return. `EmptyQueue` is the
//!   expected "nothing to do" signal of a polling consumer.
//! - `ScopedError<E>`: result of a scoped read, keeping the caller's own
//!   processing error intact.

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected or failed an operation.
    #[error("store {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// A previous holder of the connection panicked mid-transaction.
    #[error("store connection poisoned")]
    Poisoned,

    /// The blocking task running the store call did not complete.
    #[error("store task aborted: {0}")]
    TaskAborted(String),
}

impl StoreError {
    pub fn backend<E>(operation: &'static str, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// No record in the queue is unlocked or holding a stale lease.
    #[error("queue `{queue}` is empty")]
    EmptyQueue { queue: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("payload codec: {0}")]
    Codec(#[from] serde_json::Error),

    /// A row came back in a shape the schema does not produce.
    #[error("invalid message record: {0}")]
    InvalidRecord(String),
}

impl QueueError {
    pub fn empty(queue: impl Into<String>) -> Self {
        Self::EmptyQueue {
            queue: queue.into(),
        }
    }

    pub fn is_empty_queue(&self) -> bool {
        matches!(self, Self::EmptyQueue { .. })
    }
}

/// Outcome of a scoped read that did not succeed.
///
/// `Processing` carries the block's error exactly as it was returned; the
/// message has already been released for immediate re-lease by then.
#[derive(Debug, Error)]
pub enum ScopedError<E> {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("message processing failed: {0}")]
    Processing(E),
}

impl<E> ScopedError<E> {
    pub fn is_empty_queue(&self) -> bool {
        matches!(self, Self::Queue(err) if err.is_empty_queue())
    }

    pub fn into_processing(self) -> Option<E> {
        match self {
            Self::Processing(err) => Some(err),
            Self::Queue(_) => None,
        }
    }
}
