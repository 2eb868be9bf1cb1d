//! WorkerGroup - polling consumers.
//!
//! Each worker repeats a scoped read: receive, hand the message to the
//! handler, ack on success, release on failure. When the queue is observed
//! empty (or a message just failed) the worker sleeps for the poll interval,
//! or until shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::domain::errors::ScopedError;
use crate::domain::message::Message;
use crate::queue::Queue;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Processes one message.
///
/// Returning `Err` releases the message for immediate re-lease, so a
/// handler that always fails on some payload sees it again every poll.
/// Handlers must tolerate seeing a message more than once.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Handled and acked.
    pub processed: u64,
    /// Handler errors (message released).
    pub failed: u64,
}

impl std::ops::Add for WorkerStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            processed: self.processed + other.processed,
            failed: self.failed + other.failed,
        }
    }
}

/// Worker group handle.
/// - `request_shutdown` stops workers from taking new messages
/// - dropping the group stops them the next time they go idle
/// - `shutdown_and_join()` waits for in-flight messages to finish
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<WorkerStats>>,
}

impl WorkerGroup {
    /// Spawn `config.workers` workers on the current runtime.
    pub fn spawn(queue: Queue, handler: Arc<dyn MessageHandler>, config: &WorkerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poll_interval = config.poll_interval();

        let mut joins = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let rx = shutdown_rx.clone();

            joins.push(tokio::spawn(worker_loop(
                worker_id,
                queue,
                handler,
                poll_interval,
                rx,
            )));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Ask every worker to stop after its current message.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers; returns their combined stats.
    pub async fn shutdown_and_join(self) -> WorkerStats {
        self.request_shutdown();
        let mut total = WorkerStats::default();
        for join in self.joins {
            match join.await {
                Ok(stats) => total = total + stats,
                Err(err) => warn!(error = %err, "worker task ended abnormally"),
            }
        }
        total
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Queue,
    handler: Arc<dyn MessageHandler>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    debug!(worker_id, queue = queue.name(), "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let handler = &handler;
        let result = queue
            .with_message(|message| async move { handler.handle(&message).await })
            .await;

        match result {
            Ok(()) => {
                stats.processed += 1;
                continue;
            }
            Err(err) if err.is_empty_queue() => {}
            Err(ScopedError::Processing(err)) => {
                stats.failed += 1;
                warn!(worker_id, error = %err, "handler failed; message released");
            }
            Err(ScopedError::Queue(err)) => {
                warn!(worker_id, error = %err, "queue unavailable");
            }
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender gone: nobody can ask us to stop any more
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }

    debug!(worker_id, processed = stats.processed, failed = stats.failed, "worker stopped");
    stats
}
