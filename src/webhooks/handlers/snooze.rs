//! The snooze policy: activity on an issue clears its marker label.
//!
//! Comments (from anyone outside the exemption organization) and new commits
//! on a pull request mean the conversation has moved, so the marker that says
//! "waiting on someone" comes off.

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::config::RepositoryConfig;
use crate::github::{GitHubClient, Issue, Membership};
use crate::webhooks::events::{GitHubEvent, PrAction};
use crate::webhooks::{DecodedMessage, parse_event};

use super::{EventHandler, HandlerError, Outcome, SkipReason};

/// What the snooze handler looks for and who it ignores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozePolicy {
    /// The label to clear.
    pub marker_label: String,

    /// Comments by members of this organization leave the label alone.
    pub exempt_org: Option<String>,
}

impl SnoozePolicy {
    pub fn new(marker_label: impl Into<String>, exempt_org: Option<String>) -> Self {
        SnoozePolicy {
            marker_label: marker_label.into(),
            exempt_org,
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        SnoozePolicy::new(config.snooze_label.clone(), config.exempt_org.clone())
    }
}

/// Applies the snooze policy to one event.
///
/// | Event | Actor check | Issue | Action |
/// |-------|-------------|-------|--------|
/// | `issue_comment` | yes | `issue` in payload | clear label |
/// | `pull_request_review_comment` | yes | GET `issue_url` | clear label |
/// | `pull_request` / `synchronize` | no | GET `issue_url` | clear label |
/// | `pull_request` / other | - | - | skip |
/// | other events | - | - | warn, skip |
#[instrument(skip(github, event, policy), fields(event_type = event.event_type()))]
pub async fn handle_event(
    github: &GitHubClient,
    event: &GitHubEvent,
    policy: &SnoozePolicy,
) -> Result<Outcome, HandlerError> {
    match event {
        GitHubEvent::IssueComment(comment) => {
            if is_exempt(github, policy, &comment.author_login).await? {
                return Ok(Outcome::Skipped(SkipReason::Exempt));
            }
            clear_label_if_set(github, &comment.issue, &policy.marker_label).await
        }

        GitHubEvent::PullRequestReviewComment(comment) => {
            if is_exempt(github, policy, &comment.author_login).await? {
                return Ok(Outcome::Skipped(SkipReason::Exempt));
            }
            let issue = github.get_issue(&comment.pull_request.issue_url).await?;
            clear_label_if_set(github, &issue, &policy.marker_label).await
        }

        GitHubEvent::PullRequest(pr) => match &pr.action {
            PrAction::Synchronize => {
                let issue = github.get_issue(&pr.pull_request.issue_url).await?;
                clear_label_if_set(github, &issue, &policy.marker_label).await
            }
            action => {
                debug!(?action, pr = %pr.pull_request.html_url, "Ignoring pull request action");
                Ok(Outcome::Skipped(SkipReason::NotApplicable))
            }
        },

        GitHubEvent::Other(event_type) => {
            warn!(event_type = %event_type, "No snooze rule for event type");
            Ok(Outcome::Skipped(SkipReason::UnknownEvent))
        }
    }
}

/// Returns true if `login` is in the policy's exemption organization.
async fn is_exempt(
    github: &GitHubClient,
    policy: &SnoozePolicy,
    login: &str,
) -> Result<bool, HandlerError> {
    let Some(org) = policy.exempt_org.as_deref() else {
        return Ok(false);
    };

    match github.check_membership(org, login).await? {
        Membership::Member => {
            debug!(login, org, "Actor is exempt from clearing snooze");
            Ok(true)
        }
        Membership::NotMember => Ok(false),
    }
}

/// Removes `label` from `issue` if it is attached.
///
/// The write is a full label-set replacement built from the labels the
/// issue had when it was read.
async fn clear_label_if_set(
    github: &GitHubClient,
    issue: &Issue,
    label: &str,
) -> Result<Outcome, HandlerError> {
    if !issue.has_label(label) {
        return Ok(Outcome::Skipped(SkipReason::LabelAbsent));
    }

    github
        .replace_labels(&issue.url, &issue.labels_without(label))
        .await?;
    info!(issue = %issue.html_url, label, "Cleared snooze label");
    Ok(Outcome::Cleared)
}

/// [`EventHandler`] that applies a [`SnoozePolicy`] through a GitHub client.
#[derive(Debug, Clone)]
pub struct SnoozeHandler {
    github: GitHubClient,
    policy: SnoozePolicy,
}

impl SnoozeHandler {
    pub fn new(github: GitHubClient, policy: SnoozePolicy) -> Self {
        SnoozeHandler { github, policy }
    }

    pub fn policy(&self) -> &SnoozePolicy {
        &self.policy
    }
}

#[async_trait]
impl EventHandler for SnoozeHandler {
    fn name(&self) -> &str {
        "snooze"
    }

    async fn handle(&self, message: &DecodedMessage) -> Result<Outcome, HandlerError> {
        let event = parse_event(&message.event_type, &message.payload)?;
        handle_event(&self.github, &event, &self.policy).await
    }
}
