//! Domain model: message ids, leased messages, queue counts, errors.

pub mod counts;
pub mod errors;
pub mod ids;
pub mod message;

pub use self::counts::QueueCounts;
pub use self::errors::{QueueError, ScopedError, StoreError};
pub use self::ids::MessageId;
pub use self::message::{Delivery, Message};
