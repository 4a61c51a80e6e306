//! Webhook registration payloads.
//!
//! The repository pushes events to SNS through GitHub's `amazonsns` hook
//! type. The hook is scoped to an explicit list of events; a single event is
//! still a one-element list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AwsCredentials;

/// Events the snooze handler knows how to interpret.
pub const LISTEN_EVENTS: [&str; 3] = [
    "issue_comment",
    "pull_request",
    "pull_request_review_comment",
];

/// Hook type GitHub uses for SNS delivery.
const SNS_HOOK_NAME: &str = "amazonsns";

/// An ordered list of GitHub webhook event names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WebhookEvents(Vec<String>);

impl WebhookEvents {
    /// Creates a list from any sequence of event names, keeping order.
    pub fn new<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WebhookEvents(events.into_iter().map(Into::into).collect())
    }

    /// Creates a one-element list.
    pub fn single(event: impl Into<String>) -> Self {
        WebhookEvents(vec![event.into()])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for WebhookEvents {
    fn default() -> Self {
        WebhookEvents::new(LISTEN_EVENTS)
    }
}

impl From<Vec<String>> for WebhookEvents {
    fn from(events: Vec<String>) -> Self {
        WebhookEvents(events)
    }
}

impl fmt::Display for WebhookEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(","))
    }
}

/// Body of `POST /repos/{owner}/{repo}/hooks`.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct HookRequest {
    pub name: &'static str,
    pub active: bool,
    pub config: SnsHookConfig,
    pub events: WebhookEvents,
}

impl HookRequest {
    /// Builds an `amazonsns` hook that publishes `events` to `topic_arn`.
    pub fn amazon_sns(aws: &AwsCredentials, topic_arn: impl Into<String>, events: WebhookEvents) -> Self {
        HookRequest {
            name: SNS_HOOK_NAME,
            active: true,
            config: SnsHookConfig {
                aws_key: aws.key.clone(),
                aws_secret: aws.secret.clone(),
                sns_topic: topic_arn.into(),
                sns_region: aws.region.clone(),
            },
            events,
        }
    }
}

impl fmt::Debug for HookRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRequest")
            .field("name", &self.name)
            .field("sns_topic", &self.config.sns_topic)
            .field("sns_region", &self.config.sns_region)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

/// Configuration block of an `amazonsns` hook.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct SnsHookConfig {
    pub aws_key: String,
    pub aws_secret: String,
    pub sns_topic: String,
    pub sns_region: String,
}

/// Result of a hook registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// GitHub created a new hook with this id.
    Created { id: u64 },
    /// An identical hook was already registered.
    AlreadyExists,
}
