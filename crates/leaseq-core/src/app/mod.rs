//! App - runtime pieces built on the queue.
//!
//! - **WorkerGroup**: N polling consumers feeding a `MessageHandler`

pub mod worker_loop;

pub use self::worker_loop::{HandlerError, MessageHandler, WorkerGroup, WorkerStats};
