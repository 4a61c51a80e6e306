//! Webhook deliveries as they arrive from the queue.
//!
//! This module provides:
//! - Decoding of SNS notification bodies into (event type, payload) pairs
//! - Typed parsing of the event kinds the snooze policy understands
//! - The handler trait and the snooze label policy

pub mod decode;
pub mod events;
pub mod handlers;
pub mod parser;

pub use decode::{DecodeError, DecodedMessage, MessageLayer, decode};
pub use events::{
    GitHubEvent, IssueCommentEvent, PrAction, PullRequestEvent, PullRequestRef,
    ReviewCommentEvent,
};
pub use handlers::{
    EventHandler, HandlerError, Outcome, SkipReason, SnoozeHandler, SnoozePolicy, handle_event,
};
pub use parser::{ParseError, parse_event};
