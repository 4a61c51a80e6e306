//! Notification channels: a durable queue fed by a fan-out topic.
//!
//! GitHub publishes webhook deliveries to a topic; the topic fans them out to
//! a queue; the listener drains the queue. [`ChannelBackend`] is the seam
//! between that pipeline and whatever actually stores the messages:
//!
//! - [`AwsChannel`] talks to SNS and SQS over signed HTTPS
//! - [`MemoryChannel`] keeps everything in process, for tests and dry runs
//!
//! Every creation call is create-or-get: asking for a queue or topic that
//! already exists returns the existing resource.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{MessageId, ReceiptHandle};

pub mod aws;
pub mod memory;
pub mod retry;

pub use aws::{AwsChannel, AwsEndpoints};
pub use memory::MemoryChannel;
pub use retry::{RetryConfig, RetryPolicy};

/// Upper bound on messages per receive call (an SQS limit).
pub const MAX_BATCH: u32 = 10;

/// Message attribute GitHub's SNS hook sets to the event name.
pub const EVENT_ATTRIBUTE: &str = "X-Github-Event";

/// Error type for channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The service answered with an error document.
    #[error("{service} request failed (HTTP {status}): {code}: {message}")]
    Service {
        service: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    /// The request never got a response.
    #[error("{service} transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered 2xx with a body that could not be interpreted.
    #[error("{service} returned an unexpected response: {message}")]
    Protocol {
        service: &'static str,
        message: String,
    },

    #[error("queue {0} does not exist")]
    NoSuchQueue(String),

    #[error("topic {0} does not exist")]
    NoSuchTopic(String),

    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl ChannelError {
    /// Returns true if the same request could succeed if sent again.
    ///
    /// Server errors, throttling and network failures are transient;
    /// everything else (bad credentials, missing resources, malformed
    /// responses) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ChannelError::Service { status, code, .. } => {
                *status >= 500 || code.contains("Throttl") || code.contains("RequestLimitExceeded")
            }
            ChannelError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request()
            }
            ChannelError::Protocol { .. }
            | ChannelError::NoSuchQueue(_)
            | ChannelError::NoSuchTopic(_)
            | ChannelError::InvalidEndpoint { .. } => false,
        }
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// A queue as the backend knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    /// Address used for receive and delete calls.
    pub url: String,
    /// Identifier used as a subscription endpoint.
    pub arn: String,
}

/// A topic as the backend knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    pub name: String,
    pub arn: String,
}

/// Parameters of one receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Long-poll for up to this long when the queue is empty.
    pub wait: Option<Duration>,
    /// At most this many messages; clamped to [`MAX_BATCH`].
    pub max_messages: u32,
    /// Message attributes to return with each message.
    pub attribute_names: Vec<String>,
}

impl ReceiveRequest {
    /// A full batch asking for the event-type attribute.
    pub fn batch(wait: Option<Duration>) -> Self {
        ReceiveRequest {
            wait,
            max_messages: MAX_BATCH,
            attribute_names: vec![EVENT_ATTRIBUTE.to_string()],
        }
    }
}

/// One received message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: MessageId,

    /// Token for acknowledging this delivery.
    pub receipt: ReceiptHandle,

    /// Raw body; for SNS deliveries, the JSON notification document.
    pub body: String,

    /// Queue-level message attributes that were requested and present.
    pub attributes: BTreeMap<String, String>,
}

/// Storage and transport for notification channels.
#[async_trait]
pub trait ChannelBackend: Send + Sync {
    /// Creates the named queue, or returns it if it exists.
    async fn create_queue(&self, name: &str) -> Result<QueueHandle>;

    /// Creates the named topic, or returns it if it exists.
    async fn create_topic(&self, name: &str) -> Result<TopicHandle>;

    /// Delivers everything published to `topic` into `queue`.
    ///
    /// Subscribing the same pair twice leaves one subscription.
    async fn subscribe(&self, topic: &TopicHandle, queue: &QueueHandle) -> Result<()>;

    /// Receives up to `request.max_messages` messages.
    async fn receive(&self, queue: &QueueHandle, request: &ReceiveRequest)
    -> Result<Vec<Envelope>>;

    /// Removes a delivered message from the queue.
    async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<()>;
}
