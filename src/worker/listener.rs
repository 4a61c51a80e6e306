//! Per-repository consumer loop.
//!
//! A [`RepositoryListener`] owns one queue and an ordered list of handlers.
//! Each poll receives a batch and, for every message in channel order:
//!
//! ```text
//! received ─► decoded ──────► handlers 1..N (in order) ─► acknowledged
//!        └──► decode failed ───────────────────────────────┘
//! ```
//!
//! A handler's error or panic is logged with the handler name and payload;
//! the next handler still runs. The message is deleted after the handler loop
//! no matter what happened in it. There is no retry and no dead-letter path:
//! a delivery that could not be handled is logged and dropped.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace};

use crate::channel::{ChannelBackend, ChannelError, Envelope, QueueHandle};
use crate::provision::Channel;
use crate::types::{MessageId, RepoId};
use crate::webhooks::{DecodedMessage, EventHandler, decode};

use super::poll::{PollConfig, receive_request};

/// Errors that stop a listener.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Receiving failed after transport retries.
    #[error("receiving from {queue}: {source}")]
    Receive {
        queue: String,
        #[source]
        source: ChannelError,
    },

    /// Deleting a handled message failed after transport retries.
    #[error("acknowledging message {message_id} on {queue}: {source}")]
    Acknowledge {
        queue: String,
        message_id: MessageId,
        #[source]
        source: ChannelError,
    },
}

/// Result type for listener operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// What one poll did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Messages in the batch.
    pub received: usize,
    /// Messages whose body could not be decoded.
    pub decode_failures: usize,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: usize,
    /// Handler invocations that changed remote state.
    pub applied: usize,
    /// Messages deleted from the queue.
    pub acknowledged: usize,
}

/// Consumes one repository's queue.
pub struct RepositoryListener {
    repo: RepoId,
    queue: QueueHandle,
    backend: Arc<dyn ChannelBackend>,
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl RepositoryListener {
    pub fn new(repo: RepoId, queue: QueueHandle, backend: Arc<dyn ChannelBackend>) -> Self {
        RepositoryListener {
            repo,
            queue,
            backend,
            handlers: Vec::new(),
        }
    }

    /// Creates a listener on a provisioned channel.
    pub fn for_channel(channel: &Channel, backend: Arc<dyn ChannelBackend>) -> Self {
        Self::new(channel.repo.clone(), channel.queue.clone(), backend)
    }

    /// Appends a handler. Handlers run in registration order; registering the
    /// same handler twice runs it twice.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        debug!(repo = %self.repo, handler = handler.name(), "Registered handler");
        self.handlers.push(handler);
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn queue(&self) -> &QueueHandle {
        &self.queue
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Receives one batch and processes every message in it.
    ///
    /// With `wait` set, an empty queue holds the receive open for up to 20
    /// seconds. Only channel failures are errors; decode and handler failures
    /// are logged and counted in the summary.
    #[instrument(skip(self), fields(repo = %self.repo))]
    pub async fn poll(&self, wait: bool) -> Result<PollSummary> {
        let batch = self
            .backend
            .receive(&self.queue, &receive_request(wait))
            .await
            .map_err(|source| WorkerError::Receive {
                queue: self.queue.name.clone(),
                source,
            })?;

        let mut summary = PollSummary {
            received: batch.len(),
            ..PollSummary::default()
        };
        for envelope in &batch {
            self.process(envelope, &mut summary).await?;
        }

        if summary.received > 0 {
            debug!(?summary, "Poll complete");
        } else {
            trace!("Empty poll");
        }
        Ok(summary)
    }

    async fn process(&self, envelope: &Envelope, summary: &mut PollSummary) -> Result<()> {
        match decode(envelope) {
            Ok(message) => self.dispatch(envelope, &message, summary).await,
            Err(e) => {
                summary.decode_failures += 1;
                error!(
                    message_id = %envelope.message_id,
                    error = %e,
                    body = %envelope.body,
                    "Could not decode message; discarding"
                );
            }
        }

        self.backend
            .delete(&self.queue, &envelope.receipt)
            .await
            .map_err(|source| WorkerError::Acknowledge {
                queue: self.queue.name.clone(),
                message_id: envelope.message_id.clone(),
                source,
            })?;
        summary.acknowledged += 1;
        Ok(())
    }

    /// Runs every handler on one message, isolating each from the others.
    async fn dispatch(&self, envelope: &Envelope, message: &DecodedMessage, summary: &mut PollSummary) {
        for handler in &self.handlers {
            let result = AssertUnwindSafe(handler.handle(message)).catch_unwind().await;
            match result {
                Ok(Ok(outcome)) => {
                    if outcome.applied() {
                        summary.applied += 1;
                    }
                    debug!(
                        message_id = %envelope.message_id,
                        handler = handler.name(),
                        event_type = %message.event_type,
                        ?outcome,
                        "Handled message"
                    );
                }
                Ok(Err(e)) => {
                    summary.handler_failures += 1;
                    error!(
                        message_id = %envelope.message_id,
                        handler = handler.name(),
                        event_type = %message.event_type,
                        error_kind = e.kind(),
                        retriable = e.is_retriable(),
                        error = %e,
                        payload = %message.payload,
                        "Handler failed"
                    );
                }
                Err(panic) => {
                    summary.handler_failures += 1;
                    error!(
                        message_id = %envelope.message_id,
                        handler = handler.name(),
                        event_type = %message.event_type,
                        panic = %panic_message(panic.as_ref()),
                        payload = %message.payload,
                        "Handler panicked"
                    );
                }
            }
        }
    }

    /// Polls until `cancel` fires or the channel fails.
    ///
    /// Cancellation is checked between polls, so an in-flight batch is always
    /// finished and acknowledged.
    pub async fn run(&self, config: &PollConfig, cancel: CancellationToken) -> Result<()> {
        info!(
            repo = %self.repo,
            queue = %self.queue.name,
            handlers = self.handlers.len(),
            long_poll = config.long_poll,
            "Listener started"
        );

        while !cancel.is_cancelled() {
            self.poll(config.long_poll).await?;

            if !config.poll_interval.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.poll_interval) => {}
                }
            }
        }

        info!(repo = %self.repo, "Listener stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RepositoryListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryListener")
            .field("repo", &self.repo)
            .field("queue", &self.queue.name)
            .field(
                "handlers",
                &self.handlers.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
