//! Wiring a repository's notification path.
//!
//! For each repository:
//!
//! 1. create (or reuse) the queue `snooze__<owner>__<repo>`
//! 2. create (or reuse) the topic `<owner>__<repo>`
//! 3. subscribe the queue to the topic
//! 4. register an `amazonsns` webhook on the repository pointing at the topic
//!
//! Every step is create-or-get, so provisioning an already wired repository
//! changes nothing. Any failure aborts provisioning of that repository; there
//! is no retry at this level.

use thiserror::Error;
use tracing::{info, instrument};

use crate::channel::{ChannelBackend, ChannelError, QueueHandle, TopicHandle};
use crate::config::{AwsCredentials, RepositoryConfig};
use crate::github::{GitHubApiError, GitHubClient, HookOutcome, HookRequest, WebhookEvents};
use crate::types::RepoId;

/// Error type for provisioning failures.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("creating queue {name}: {source}")]
    Queue {
        name: String,
        #[source]
        source: ChannelError,
    },

    #[error("creating topic {name}: {source}")]
    Topic {
        name: String,
        #[source]
        source: ChannelError,
    },

    #[error("subscribing queue {queue} to topic {topic}: {source}")]
    Subscribe {
        queue: String,
        topic: String,
        #[source]
        source: ChannelError,
    },

    #[error("registering webhook on {repo}: {source}")]
    Hook {
        repo: RepoId,
        #[source]
        source: GitHubApiError,
    },
}

/// A provisioned channel for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub repo: RepoId,
    pub queue: QueueHandle,
    pub topic: TopicHandle,
    /// What the webhook registration found.
    pub hook: HookOutcome,
}

/// Wires the notification path for `repo`.
///
/// `aws` is embedded in the webhook so GitHub can publish to the topic.
#[instrument(skip(backend, github, aws), fields(repo = %repo, events = %events))]
pub async fn provision(
    backend: &dyn ChannelBackend,
    github: &GitHubClient,
    repo: &RepoId,
    aws: &AwsCredentials,
    events: &WebhookEvents,
) -> Result<Channel, ProvisionError> {
    let queue_name = repo.queue_name();
    let topic_name = repo.canonical_name();

    let queue = backend
        .create_queue(&queue_name)
        .await
        .map_err(|source| ProvisionError::Queue {
            name: queue_name.clone(),
            source,
        })?;
    let topic = backend
        .create_topic(&topic_name)
        .await
        .map_err(|source| ProvisionError::Topic {
            name: topic_name.clone(),
            source,
        })?;
    backend
        .subscribe(&topic, &queue)
        .await
        .map_err(|source| ProvisionError::Subscribe {
            queue: queue_name.clone(),
            topic: topic_name.clone(),
            source,
        })?;

    let hook = HookRequest::amazon_sns(aws, topic.arn.clone(), events.clone());
    let outcome = github
        .create_hook(repo, &hook)
        .await
        .map_err(|source| ProvisionError::Hook {
            repo: repo.clone(),
            source,
        })?;

    info!(
        queue = %queue.url,
        topic = %topic.arn,
        hook = ?outcome,
        "Provisioned notification channel"
    );

    Ok(Channel {
        repo: repo.clone(),
        queue,
        topic,
        hook: outcome,
    })
}

/// [`provision`] with everything taken from a repository's configuration.
pub async fn provision_repository(
    backend: &dyn ChannelBackend,
    github: &GitHubClient,
    config: &RepositoryConfig,
) -> Result<Channel, ProvisionError> {
    provision(backend, github, &config.repo, &config.aws, &config.events).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Envelope, MemoryChannel, ReceiveRequest};
    use crate::config::GitHubCredentials;
    use crate::types::ReceiptHandle;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn github_for(server: &MockServer) -> GitHubClient {
        GitHubClient::with_base_uri(&GitHubCredentials::new("frodo", "baggins"), &server.uri())
            .unwrap()
    }

    fn aws() -> AwsCredentials {
        AwsCredentials::new("shire", "precious", "us-west-2")
    }

    fn repo() -> RepoId {
        RepoId::new("tdsmith", "test_repo")
    }

    #[tokio::test]
    async fn provisioning_twice_reuses_everything() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/tdsmith/test_repo/hooks"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/tdsmith/test_repo/hooks"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "message": "Validation Failed",
                "errors": [{"message": "Hook already exists on this repository"}]
            })))
            .mount(&server)
            .await;

        let backend = MemoryChannel::new();
        let github = github_for(&server);
        let events = WebhookEvents::default();

        let first = provision(&backend, &github, &repo(), &aws(), &events).await.unwrap();
        let second = provision(&backend, &github, &repo(), &aws(), &events).await.unwrap();

        assert_eq!(first.queue, second.queue);
        assert_eq!(first.topic, second.topic);
        assert_eq!(first.queue.name, "snooze__tdsmith__test_repo");
        assert_eq!(first.topic.name, "tdsmith__test_repo");
        assert_eq!(first.hook, HookOutcome::Created { id: 7 });
        assert_eq!(second.hook, HookOutcome::AlreadyExists);

        assert_eq!(backend.queue_count(), 1);
        assert_eq!(backend.topic_count(), 1);
        assert_eq!(backend.subscription_count("tdsmith__test_repo"), 1);
    }

    #[tokio::test]
    async fn hook_points_at_topic_with_configured_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/tdsmith/test_repo/hooks"))
            .and(body_partial_json(json!({
                "name": "amazonsns",
                "active": true,
                "config": {
                    "sns_topic": "arn:memory:sns:local:tdsmith__test_repo",
                    "sns_region": "us-west-2"
                },
                "events": ["issue_comment"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let backend = MemoryChannel::new();
        provision(
            &backend,
            &github_for(&server),
            &repo(),
            &aws(),
            &WebhookEvents::single("issue_comment"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn published_events_reach_the_queue() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
            .mount(&server)
            .await;

        let backend = MemoryChannel::new();
        let channel = provision(
            &backend,
            &github_for(&server),
            &repo(),
            &aws(),
            &WebhookEvents::default(),
        )
        .await
        .unwrap();

        backend
            .publish(&channel.topic.name, "issue_comment", "{}")
            .unwrap();
        let batch = backend
            .receive(&channel.queue, &ReceiveRequest::batch(None))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn hook_rejection_fails_provisioning() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&server)
            .await;

        let err = provision(
            &MemoryChannel::new(),
            &github_for(&server),
            &repo(),
            &aws(),
            &WebhookEvents::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Hook { .. }));
        assert!(err.to_string().starts_with("registering webhook on tdsmith/test_repo"));
    }

    struct BrokenTopics(MemoryChannel);

    #[async_trait]
    impl ChannelBackend for BrokenTopics {
        async fn create_queue(&self, name: &str) -> crate::channel::Result<QueueHandle> {
            self.0.create_queue(name).await
        }

        async fn create_topic(&self, _name: &str) -> crate::channel::Result<TopicHandle> {
            Err(ChannelError::Service {
                service: "sns",
                status: 403,
                code: "AuthorizationError".to_string(),
                message: "not allowed".to_string(),
            })
        }

        async fn subscribe(&self, topic: &TopicHandle, queue: &QueueHandle) -> crate::channel::Result<()> {
            self.0.subscribe(topic, queue).await
        }

        async fn receive(
            &self,
            queue: &QueueHandle,
            request: &ReceiveRequest,
        ) -> crate::channel::Result<Vec<Envelope>> {
            self.0.receive(queue, request).await
        }

        async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> crate::channel::Result<()> {
            self.0.delete(queue, receipt).await
        }
    }

    #[tokio::test]
    async fn channel_failure_stops_before_webhook() {
        let server = MockServer::start().await;

        let err = provision(
            &BrokenTopics(MemoryChannel::new()),
            &github_for(&server),
            &repo(),
            &aws(),
            &WebhookEvents::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ProvisionError::Topic { ref name, .. } if name == "tdsmith__test_repo"));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
