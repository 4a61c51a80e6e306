//! GitHub webhook payload parser.
//!
//! Turns a decoded payload (already unwrapped from its SNS envelope) into a
//! typed [`GitHubEvent`]. The parser tolerates unknown fields and unknown
//! event types; only a known event type with a payload missing the fields the
//! policy needs is an error.

use serde::Deserialize;
use thiserror::Error;

use crate::github::Issue;

use super::events::{
    GitHubEvent, IssueCommentEvent, PrAction, PullRequestEvent, PullRequestRef,
    ReviewCommentEvent,
};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload does not have the shape of the named event.
    #[error("{event_type} payload is malformed: {source}")]
    Shape {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a webhook payload into a typed event.
///
/// # Returns
///
/// * `Ok(GitHubEvent::Other(_))` - an event type with no policy (not an error)
/// * `Ok(event)` - a known event type
/// * `Err(e)` - a known event type whose payload lacks required fields
pub fn parse_event(event_type: &str, payload: &serde_json::Value) -> Result<GitHubEvent, ParseError> {
    match event_type {
        "issue_comment" => parse_issue_comment(payload).map(GitHubEvent::IssueComment),
        "pull_request_review_comment" => {
            parse_review_comment(payload).map(GitHubEvent::PullRequestReviewComment)
        }
        "pull_request" => parse_pull_request(payload).map(GitHubEvent::PullRequest),
        other => Ok(GitHubEvent::Other(other.to_string())),
    }
}

fn shape(event_type: &'static str) -> impl FnOnce(serde_json::Error) -> ParseError {
    move |source| ParseError::Shape { event_type, source }
}

// ============================================================================
// Raw payload structures
//
// These mirror GitHub's webhook JSON, trimmed to what the policy reads.
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    issue_url: String,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    number: u64,
}

impl From<RawPullRequest> for PullRequestRef {
    fn from(raw: RawPullRequest) -> Self {
        PullRequestRef {
            issue_url: raw.issue_url,
            html_url: raw.html_url,
            number: raw.number,
        }
    }
}

// ============================================================================
// issue_comment
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    comment: RawComment,
    issue: Issue,
}

fn parse_issue_comment(payload: &serde_json::Value) -> Result<IssueCommentEvent, ParseError> {
    let raw = RawIssueCommentPayload::deserialize(payload).map_err(shape("issue_comment"))?;
    Ok(IssueCommentEvent {
        issue: raw.issue,
        author_login: raw.comment.user.login,
    })
}

// ============================================================================
// pull_request_review_comment
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawReviewCommentPayload {
    comment: RawComment,
    pull_request: RawPullRequest,
}

fn parse_review_comment(payload: &serde_json::Value) -> Result<ReviewCommentEvent, ParseError> {
    let raw = RawReviewCommentPayload::deserialize(payload)
        .map_err(shape("pull_request_review_comment"))?;
    Ok(ReviewCommentEvent {
        pull_request: raw.pull_request.into(),
        author_login: raw.comment.user.login,
    })
}

// ============================================================================
// pull_request
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawPullRequestPayload {
    action: String,
    pull_request: RawPullRequest,
}

fn parse_pull_request(payload: &serde_json::Value) -> Result<PullRequestEvent, ParseError> {
    let raw = RawPullRequestPayload::deserialize(payload).map_err(shape("pull_request"))?;
    Ok(PullRequestEvent {
        action: PrAction::from_verb(&raw.action),
        pull_request: raw.pull_request.into(),
    })
}
