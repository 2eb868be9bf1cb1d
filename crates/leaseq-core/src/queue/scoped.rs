//! Scoped reads: acknowledgment decided by how the caller's code exits.
//!
//! - `Ok` from the block acks (deletes) the message
//! - `Err` from the block nacks it (lease released for immediate re-lease)
//!   and hands the error back unchanged
//! - a panic, early return, or dropped future releases it from `Drop`,
//!   including a future dropped while the lease is still being taken
//!
//! A released message is picked up by a later `receive`, instead of
//! waiting out its full lease.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::handle::Queue;
use crate::domain::errors::{QueueError, ScopedError};
use crate::domain::ids::MessageId;
use crate::domain::message::{Delivery, Message};

/// A lease this process still has to resolve.
///
/// Dropped unresolved, it releases the lease on the blocking pool, or
/// inline when no tokio runtime is around.
struct PendingLease {
    queue: Queue,
    id: Option<MessageId>,
}

impl PendingLease {
    fn new(queue: Queue, id: MessageId) -> Self {
        Self {
            queue,
            id: Some(id),
        }
    }

    async fn ack(mut self) -> Result<(), QueueError> {
        match self.id.take() {
            Some(id) => self.queue.ack(id).await,
            None => Ok(()),
        }
    }

    async fn nack(mut self) -> Result<(), QueueError> {
        match self.id.take() {
            Some(id) => self.queue.nack(id).await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingLease {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let queue = self.queue.clone();
        let release = move || match queue.leases().change_lease(id, Duration::ZERO) {
            Ok(()) => debug!(queue = queue.name(), %id, "released unresolved lease"),
            Err(err) => warn!(
                queue = queue.name(),
                %id,
                error = %err,
                "failed to release unresolved lease; it will expire on its own"
            ),
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(release);
            }
            Err(_) => release(),
        }
    }
}

/// A leased message that is released unless explicitly acked.
///
/// Derefs to the `Message`.
pub struct LeaseGuard {
    lease: PendingLease,
    message: Message,
}

impl LeaseGuard {
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Done: delete the message.
    pub async fn ack(self) -> Result<(), QueueError> {
        self.lease.ack().await
    }

    /// Failed: make the message available again right away.
    pub async fn nack(self) -> Result<(), QueueError> {
        self.lease.nack().await
    }

    /// Keep holding the message for `lease` from now.
    pub async fn extend(&self, lease: Duration) -> Result<(), QueueError> {
        self.lease.queue.change_lease(self.message.id, lease).await
    }
}

impl Deref for LeaseGuard {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl std::fmt::Debug for LeaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("queue", &self.lease.queue.name())
            .field("message", &self.message)
            .finish()
    }
}

impl Queue {
    /// Receive a message wrapped in a guard that releases it on drop.
    pub async fn receive_guarded(&self) -> Result<LeaseGuard, QueueError> {
        let (lease, message) = self.receive_pending().await?;
        Ok(LeaseGuard { lease, message })
    }

    /// Lease a message together with its release guard.
    ///
    /// The guard is built inside the blocking task. If this future is
    /// dropped before the task finishes, tokio drops the task's output and
    /// with it the guard, which releases the lease.
    async fn receive_pending(&self) -> Result<(PendingLease, Message), QueueError> {
        let name: Arc<str> = Arc::from(self.name());
        let queue = self.clone();
        self.blocking(move |leases| {
            let message = leases.lease(&name)?;
            Ok((PendingLease::new(queue, message.id), message))
        })
        .await
    }

    /// Receive one message and run `f` on it; ack on `Ok`, nack on `Err`.
    ///
    /// An empty queue is `ScopedError::Queue(QueueError::EmptyQueue { .. })`.
    ///
    /// ```ignore
    /// let sent = queue
    ///     .with_message(|message| async move { mailer.deliver(message.payload()).await })
    ///     .await?;
    /// ```
    pub async fn with_message<F, Fut, T, E>(&self, f: F) -> Result<T, ScopedError<E>>
    where
        F: FnOnce(Message) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (lease, message) = self.receive_pending().await?;
        self.run_scoped(lease, message, f).await
    }

    /// Like `with_message`, but an empty queue runs `f` with
    /// `Delivery::Default(default)` instead of failing. Nothing is acked or
    /// nacked for a default.
    pub async fn with_message_or<F, Fut, T, E>(
        &self,
        default: impl Into<Vec<u8>>,
        f: F,
    ) -> Result<T, ScopedError<E>>
    where
        F: FnOnce(Delivery) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.receive_pending().await {
            Ok((lease, message)) => {
                self.run_scoped(lease, message, |message| f(Delivery::Leased(message)))
                    .await
            }
            Err(err) if err.is_empty_queue() => f(Delivery::Default(default.into()))
                .await
                .map_err(ScopedError::Processing),
            Err(err) => Err(err.into()),
        }
    }

    /// Run `f` on every message until the queue is observed empty.
    ///
    /// Stops at the first processing error, after releasing that message.
    /// Returns how many messages were processed and acked.
    pub async fn drain_each<F, Fut, E>(&self, mut f: F) -> Result<usize, ScopedError<E>>
    where
        F: FnMut(Message) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut processed = 0;
        loop {
            match self.with_message(&mut f).await {
                Ok(()) => processed += 1,
                Err(err) if err.is_empty_queue() => return Ok(processed),
                Err(err) => return Err(err),
            }
        }
    }

    /// Pull messages until the queue is observed empty. See `Drain`.
    pub fn drain(&self) -> Drain {
        Drain {
            queue: self.clone(),
            current: None,
            done: false,
        }
    }

    async fn run_scoped<F, Fut, T, E>(
        &self,
        lease: PendingLease,
        message: Message,
        f: F,
    ) -> Result<T, ScopedError<E>>
    where
        F: FnOnce(Message) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match f(message).await {
            Ok(value) => {
                lease.ack().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(release) = lease.nack().await {
                    warn!(queue = self.name(), error = %release, "nack after processing error failed");
                }
                Err(ScopedError::Processing(err))
            }
        }
    }
}

/// Draining reader over one queue.
///
/// Each `next()` acks the message returned by the previous call, then
/// leases another. The message currently held is released, not acked, if
/// the drain is dropped (a `break`, `?` or panic in the loop body) or
/// `fail()` is called.
///
/// ```ignore
/// let mut drain = queue.drain();
/// while let Some(message) = drain.next().await {
///     handle(message?)?;
/// }
/// ```
///
/// A drain ends for good at the first empty observation or store error;
/// call `Queue::drain` again to poll afresh.
pub struct Drain {
    queue: Queue,
    current: Option<PendingLease>,
    done: bool,
}

impl Drain {
    pub async fn next(&mut self) -> Option<Result<Message, QueueError>> {
        if self.done {
            return None;
        }
        if let Some(previous) = self.current.take() {
            if let Err(err) = previous.ack().await {
                self.done = true;
                return Some(Err(err));
            }
        }

        match self.queue.receive_pending().await {
            Ok((lease, message)) => {
                self.current = Some(lease);
                Some(Ok(message))
            }
            Err(err) if err.is_empty_queue() => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }

    /// Release the current message for immediate re-lease and keep going.
    pub async fn fail(&mut self) -> Result<(), QueueError> {
        match self.current.take() {
            Some(lease) => lease.nack().await,
            None => Ok(()),
        }
    }

    /// Ack the current message and stop.
    pub async fn finish(mut self) -> Result<(), QueueError> {
        self.done = true;
        match self.current.take() {
            Some(lease) => lease.ack().await,
            None => Ok(()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
