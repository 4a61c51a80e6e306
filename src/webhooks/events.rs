//! GitHub webhook event types.
//!
//! Typed representations of the events the snooze relay listens for. Each
//! variant carries just the fields the label policy reads: where the issue
//! lives, what labels it has (when the payload includes them), who acted and,
//! for pull requests, what happened.
//!
//! # Event Types
//!
//! - `issue_comment` - a comment on an issue or on a PR's conversation tab
//! - `pull_request_review_comment` - an inline comment on a PR diff
//! - `pull_request` - PR lifecycle; only `synchronize` matters here
//!
//! Everything else decodes to [`GitHubEvent::Other`] so the caller can log
//! it and move on.

use serde::{Deserialize, Serialize};

use crate::github::Issue;

/// A parsed GitHub webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitHubEvent {
    /// A comment on an issue or on a pull request's conversation tab.
    ///
    /// GitHub delivers the full issue record, labels included, so no
    /// secondary lookup is needed.
    IssueComment(IssueCommentEvent),

    /// An inline review comment on a pull request diff.
    ///
    /// The payload describes the pull request, not its issue; labels are
    /// reached through `pull_request.issue_url`.
    PullRequestReviewComment(ReviewCommentEvent),

    /// A pull request lifecycle event.
    PullRequest(PullRequestEvent),

    /// Any event type the relay has no policy for, by name.
    Other(String),
}

impl GitHubEvent {
    /// Returns the `X-GitHub-Event` name this event was delivered under.
    pub fn event_type(&self) -> &str {
        match self {
            GitHubEvent::IssueComment(_) => "issue_comment",
            GitHubEvent::PullRequestReviewComment(_) => "pull_request_review_comment",
            GitHubEvent::PullRequest(_) => "pull_request",
            GitHubEvent::Other(name) => name,
        }
    }
}

/// An `issue_comment` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueCommentEvent {
    /// The commented issue, with its labels at delivery time.
    pub issue: Issue,

    /// Login of the comment author.
    pub author_login: String,
}

/// A `pull_request_review_comment` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCommentEvent {
    pub pull_request: PullRequestRef,

    /// Login of the comment author.
    pub author_login: String,
}

/// The parts of a pull request record that lead back to its issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    /// API url of the issue half of the pull request.
    pub issue_url: String,

    /// Browser url, for logs.
    pub html_url: String,

    pub number: u64,
}

/// Action performed on a pull request.
///
/// Only `Synchronize` clears a snooze; the rest are kept by name so they show
/// up in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrAction {
    /// PR was opened.
    Opened,
    /// PR was closed (merged or not).
    Closed,
    /// PR was edited.
    Edited,
    /// PR head was updated (new commits pushed).
    Synchronize,
    /// PR was reopened.
    Reopened,
    /// Any other action (labeled, assigned, review_requested, ...).
    Other(String),
}

impl PrAction {
    /// Maps GitHub's action verb onto the enum.
    pub fn from_verb(verb: &str) -> Self {
        match verb {
            "opened" => PrAction::Opened,
            "closed" => PrAction::Closed,
            "edited" => PrAction::Edited,
            "synchronize" => PrAction::Synchronize,
            "reopened" => PrAction::Reopened,
            other => PrAction::Other(other.to_string()),
        }
    }
}

/// A `pull_request` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub action: PrAction,

    pub pull_request: PullRequestRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_names_round_trip_through_other() {
        assert_eq!(GitHubEvent::Other("push".to_string()).event_type(), "push");
    }

    #[test]
    fn pr_action_keeps_unknown_verbs() {
        assert_eq!(PrAction::from_verb("synchronize"), PrAction::Synchronize);
        assert_eq!(
            PrAction::from_verb("labeled"),
            PrAction::Other("labeled".to_string())
        );
    }
}
