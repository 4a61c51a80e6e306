//! Runs one listener per repository and watches for the first to stop.
//!
//! Listeners are independent tokio tasks in a `JoinSet`. A listener is meant
//! to run forever, so any exit (an error, a panic, or a plain return that was
//! not asked for) is fatal: the supervisor cancels the rest and reports which
//! repository went down. Cancelling the supervisor's token is the one clean
//! way out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::types::RepoId;

use super::listener::{RepositoryListener, WorkerError, panic_message};
use super::poll::PollConfig;

/// How a listener task ended.
#[derive(Debug, Error)]
pub enum WorkerExit {
    #[error(transparent)]
    Failed(#[from] WorkerError),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("stopped without an error")]
    Returned,
}

/// Error type for supervision.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A listener stopped while the process was meant to keep running.
    #[error("worker for {repo} exited: {cause}")]
    WorkerExited {
        repo: RepoId,
        #[source]
        cause: WorkerExit,
    },

    /// A listener task could not be joined.
    #[error("worker task could not be joined: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Supervises the listeners of every configured repository.
pub struct Supervisor {
    tasks: JoinSet<(RepoId, Option<WorkerExit>)>,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Creates a supervisor whose listeners stop when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Supervisor {
            tasks: JoinSet::new(),
            shutdown,
        }
    }

    /// Returns the token that stops every listener.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Starts a listener task.
    pub fn spawn(&mut self, listener: RepositoryListener, config: PollConfig) {
        let repo = listener.repo().clone();
        let cancel = self.shutdown.child_token();
        let listener = Arc::new(listener);

        info!(repo = %repo, "Starting listener");
        self.tasks.spawn(async move {
            let result = AssertUnwindSafe(listener.run(&config, cancel.clone()))
                .catch_unwind()
                .await;
            let exit = match result {
                Ok(Ok(())) if cancel.is_cancelled() => None,
                Ok(Ok(())) => Some(WorkerExit::Returned),
                Ok(Err(e)) => Some(WorkerExit::Failed(e)),
                Err(panic) => Some(WorkerExit::Panicked(panic_message(panic.as_ref()))),
            };
            (repo, exit)
        });
    }

    /// Waits until a listener stops or shutdown is requested.
    ///
    /// Returns `Ok` only for a requested shutdown, after every listener has
    /// finished its current poll. Otherwise the first listener's exit is
    /// returned and the remaining listeners are aborted.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        while let Some(joined) = self.tasks.join_next().await {
            let (repo, exit) = match joined {
                Ok(done) => done,
                Err(e) => {
                    self.abort_all().await;
                    return Err(SupervisorError::Join(e));
                }
            };

            match exit {
                None => info!(repo = %repo, "Listener shut down"),
                Some(cause) => {
                    error!(repo = %repo, error = %cause, "Listener exited; stopping all listeners");
                    self.abort_all().await;
                    return Err(SupervisorError::WorkerExited { repo, cause });
                }
            }
        }

        Ok(())
    }

    async fn abort_all(&mut self) {
        self.shutdown.cancel();
        if !self.tasks.is_empty() {
            warn!(remaining = self.tasks.len(), "Aborting remaining listeners");
        }
        self.tasks.shutdown().await;
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("listeners", &self.tasks.len())
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{
        ChannelBackend, ChannelError, Envelope, MemoryChannel, QueueHandle, ReceiveRequest,
        TopicHandle,
    };
    use crate::types::ReceiptHandle;
    use async_trait::async_trait;
    use std::time::Duration;

    fn quick() -> PollConfig {
        PollConfig {
            long_poll: false,
            poll_interval: Duration::from_millis(5),
        }
    }

    async fn healthy_listener(channel: &MemoryChannel, owner: &str) -> RepositoryListener {
        let repo = RepoId::new(owner, "r");
        let queue = channel.create_queue(&repo.queue_name()).await.unwrap();
        RepositoryListener::new(repo, queue, Arc::new(channel.clone()))
    }

    fn missing_queue_listener(owner: &str) -> RepositoryListener {
        let queue = QueueHandle {
            name: "missing".to_string(),
            url: "memory://queue/missing".to_string(),
            arn: "arn:memory:sqs:local:missing".to_string(),
        };
        RepositoryListener::new(RepoId::new(owner, "r"), queue, Arc::new(MemoryChannel::new()))
    }

    /// A backend whose receive panics.
    struct Exploding;

    #[async_trait]
    impl ChannelBackend for Exploding {
        async fn create_queue(&self, _: &str) -> crate::channel::Result<QueueHandle> {
            Err(ChannelError::NoSuchQueue("unused".to_string()))
        }

        async fn create_topic(&self, _: &str) -> crate::channel::Result<TopicHandle> {
            Err(ChannelError::NoSuchTopic("unused".to_string()))
        }

        async fn subscribe(&self, _: &TopicHandle, _: &QueueHandle) -> crate::channel::Result<()> {
            Ok(())
        }

        async fn receive(
            &self,
            _: &QueueHandle,
            _: &ReceiveRequest,
        ) -> crate::channel::Result<Vec<Envelope>> {
            panic!("receive exploded")
        }

        async fn delete(&self, _: &QueueHandle, _: &ReceiptHandle) -> crate::channel::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn reports_first_failing_worker() {
        let channel = MemoryChannel::new();
        let mut supervisor = Supervisor::new(CancellationToken::new());
        supervisor.spawn(healthy_listener(&channel, "a").await, quick());
        supervisor.spawn(missing_queue_listener("b"), quick());
        supervisor.spawn(healthy_listener(&channel, "c").await, quick());
        assert_eq!(supervisor.len(), 3);

        let err = supervisor.run().await.unwrap_err();

        match err {
            SupervisorError::WorkerExited { repo, cause } => {
                assert_eq!(repo, RepoId::new("b", "r"));
                assert!(matches!(cause, WorkerExit::Failed(WorkerError::Receive { .. })));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn panicking_worker_is_reported() {
        let queue = QueueHandle {
            name: "q".to_string(),
            url: "u".to_string(),
            arn: "a".to_string(),
        };
        let mut supervisor = Supervisor::new(CancellationToken::new());
        supervisor.spawn(
            RepositoryListener::new(RepoId::new("p", "r"), queue, Arc::new(Exploding)),
            quick(),
        );

        let err = supervisor.run().await.unwrap_err();
        assert!(err.to_string().contains("receive exploded"));
    }

    #[tokio::test]
    async fn cancellation_is_a_clean_shutdown() {
        let channel = MemoryChannel::new();
        let shutdown = CancellationToken::new();
        let mut supervisor = Supervisor::new(shutdown.clone());
        supervisor.spawn(healthy_listener(&channel, "a").await, quick());
        supervisor.spawn(healthy_listener(&channel, "b").await, quick());

        let run = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_supervisor_returns_immediately() {
        let supervisor = Supervisor::new(CancellationToken::new());
        assert!(supervisor.is_empty());
        supervisor.run().await.unwrap();
    }
}
