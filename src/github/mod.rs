//! GitHub API client and resource types.
//!
//! This module wraps octocrab for the handful of REST calls the relay makes:
//! - Fetching an issue by url (to follow a pull request to its issue)
//! - Replacing an issue's label set
//! - Checking organization membership (actor exemption)
//! - Registering an `amazonsns` webhook (provisioning)

mod client;
mod error;
mod hooks;
mod models;

pub use client::{GITHUB_ACCEPT, GitHubClient};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use hooks::{HookOutcome, HookRequest, LISTEN_EVENTS, SnsHookConfig, WebhookEvents};
pub use models::{Issue, Label, Membership};
