//! Event handlers invoked for every decoded delivery.
//!
//! A handler receives the (event type, payload) pair and decides what, if
//! anything, to do about it. Handlers are registered on a listener in order
//! and run one after the other; the listener logs a handler's error and moves
//! on to the next, so handlers never need to guard one another.
//!
//! # Event Types
//!
//! | Event | Snooze handler |
//! |-------|----------------|
//! | `issue_comment` | check actor, clear label on `issue` |
//! | `pull_request_review_comment` | check actor, fetch `issue_url`, clear label |
//! | `pull_request` (`synchronize`) | fetch `issue_url`, clear label |
//! | anything else | warn, skip |

mod snooze;

use async_trait::async_trait;
use thiserror::Error;

use crate::github::{GitHubApiError, GitHubErrorKind};
use crate::webhooks::{DecodedMessage, ParseError};

pub use snooze::{SnoozeHandler, SnoozePolicy, handle_event};

/// Errors that can occur during event handling.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload does not match its declared event type.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A GitHub call failed.
    #[error(transparent)]
    GitHub(#[from] GitHubApiError),
}

impl HandlerError {
    /// Category of the failure, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::Parse(_) => "parse",
            HandlerError::GitHub(e) => match e.kind {
                GitHubErrorKind::Transient => "github_transient",
                GitHubErrorKind::Permanent => "github_permanent",
                GitHubErrorKind::UnexpectedStatus => "github_unexpected_status",
            },
        }
    }

    /// True if the same message would likely be handled on a later delivery.
    pub fn is_retriable(&self) -> bool {
        match self {
            HandlerError::Parse(_) => false,
            HandlerError::GitHub(e) => e.kind.is_retriable(),
        }
    }
}

/// Why a handler left an event alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The actor belongs to the exemption organization.
    Exempt,
    /// The issue does not carry the marker label.
    LabelAbsent,
    /// A known event type, but not an action the policy reacts to.
    NotApplicable,
    /// An event type the policy has no rule for.
    UnknownEvent,
}

/// What a handler did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The marker label was removed.
    Cleared,
    Skipped(SkipReason),
}

impl Outcome {
    /// True if the handler changed remote state.
    pub fn applied(&self) -> bool {
        matches!(self, Outcome::Cleared)
    }
}

/// Something that reacts to webhook deliveries.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str;

    async fn handle(&self, message: &DecodedMessage) -> Result<Outcome, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cleared_counts_as_applied() {
        assert!(Outcome::Cleared.applied());
        assert!(!Outcome::Skipped(SkipReason::Exempt).applied());
        assert!(!Outcome::Skipped(SkipReason::LabelAbsent).applied());
        assert!(!Outcome::Skipped(SkipReason::NotApplicable).applied());
        assert!(!Outcome::Skipped(SkipReason::UnknownEvent).applied());
    }

    #[test]
    fn error_kind_names_the_failure() {
        let parse = crate::webhooks::parse_event("issue_comment", &serde_json::json!({}))
            .map(|_| ())
            .unwrap_err();
        let parse = HandlerError::from(parse);
        assert_eq!(parse.kind(), "parse");
        assert!(!parse.is_retriable());

        let limited = HandlerError::from(GitHubApiError::from_status(
            http::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
        ));
        assert_eq!(limited.kind(), "github_transient");
        assert!(limited.is_retriable());

        let denied = HandlerError::from(GitHubApiError::from_status(
            http::StatusCode::UNAUTHORIZED,
            "Bad credentials",
        ));
        assert_eq!(denied.kind(), "github_permanent");
        assert!(!denied.is_retriable());

        let odd = HandlerError::from(GitHubApiError::unexpected_status(
            http::StatusCode::IM_A_TEAPOT,
            "membership check",
        ));
        assert_eq!(odd.kind(), "github_unexpected_status");
    }
}
