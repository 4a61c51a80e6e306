//! Unwrapping queue messages into webhook deliveries.
//!
//! A message delivered through SNS into SQS has three layers:
//!
//! 1. the queue message body, a JSON notification document
//! 2. its `Message` field, a *string* holding the webhook JSON
//! 3. its `MessageAttributes["X-Github-Event"]["Value"]`, the event name
//!
//! [`decode`] peels those layers and reports which one failed.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::channel::{EVENT_ATTRIBUTE, Envelope};

/// A webhook delivery recovered from a queue message.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// The `X-GitHub-Event` name.
    pub event_type: String,

    /// The webhook body.
    pub payload: serde_json::Value,
}

/// Which layer of a message could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLayer {
    /// The body is not a JSON notification with a string `Message`.
    Envelope,
    /// The notification carries no event-type attribute.
    EventType,
    /// `Message` is not JSON.
    Payload,
}

impl fmt::Display for MessageLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageLayer::Envelope => write!(f, "notification envelope"),
            MessageLayer::EventType => write!(f, "{} attribute", EVENT_ATTRIBUTE),
            MessageLayer::Payload => write!(f, "webhook payload"),
        }
    }
}

/// Error type for message decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: bad {layer}: {detail}")]
    MalformedMessage { layer: MessageLayer, detail: String },
}

impl DecodeError {
    fn at(layer: MessageLayer, detail: impl fmt::Display) -> Self {
        DecodeError::MalformedMessage {
            layer,
            detail: detail.to_string(),
        }
    }

    /// The layer that failed.
    pub fn layer(&self) -> MessageLayer {
        match self {
            DecodeError::MalformedMessage { layer, .. } => *layer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawNotification {
    #[serde(rename = "Message")]
    message: String,

    #[serde(rename = "MessageAttributes", default)]
    message_attributes: HashMap<String, RawAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    #[serde(rename = "Value")]
    value: String,
}

/// Decodes one queue message.
///
/// Never panics; any shape problem is a [`DecodeError`].
pub fn decode(envelope: &Envelope) -> Result<DecodedMessage, DecodeError> {
    let notification: RawNotification = serde_json::from_str(&envelope.body)
        .map_err(|e| DecodeError::at(MessageLayer::Envelope, e))?;

    let event_type = notification
        .message_attributes
        .get(EVENT_ATTRIBUTE)
        .map(|attribute| attribute.value.clone())
        .ok_or_else(|| DecodeError::at(MessageLayer::EventType, "missing"))?;

    let payload = serde_json::from_str(&notification.message)
        .map_err(|e| DecodeError::at(MessageLayer::Payload, e))?;

    Ok(DecodedMessage {
        event_type,
        payload,
    })
}
