//! GitHub API error types.
//!
//! Errors are categorized so callers and logs can tell a blip from a real
//! problem:
//!
//! - **Transient** errors would likely succeed later (5xx, rate limits,
//!   network failures)
//! - **Permanent** errors need a human (most 4xx, bad credentials, malformed
//!   responses)
//! - **UnexpectedStatus** means GitHub answered with a status the caller has
//!   no interpretation for (e.g. a membership check that is neither 204 nor
//!   404)
//!
//! The snooze handler does not retry GitHub calls. The listener logs the kind
//! with every handler failure, so operators can tell a rate limit from a
//! revoked token.

use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Transient error - a later attempt may succeed.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - HTTP 403 with a rate limit message
    /// - Network timeouts
    Transient,

    /// Permanent error - requires human intervention.
    ///
    /// Examples:
    /// - HTTP 4xx other than rate limits
    /// - Authentication failures (401, 403 non-rate-limit)
    /// - Response bodies that do not match the expected shape
    Permanent,

    /// GitHub returned a status with no defined meaning for this call.
    UnexpectedStatus,
}

impl GitHubErrorKind {
    /// Returns true if a later attempt could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A GitHub API error with categorization.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    /// The kind of error.
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if the request got a response.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates an error from a non-success HTTP response.
    ///
    /// `message` should carry GitHub's own `message` field when the body had
    /// one, so the log line says why the call was refused.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = match status.as_u16() {
            429 => GitHubErrorKind::Transient,
            403 if is_rate_limit_error(&message) => GitHubErrorKind::Transient,
            code if (500..600).contains(&code) => GitHubErrorKind::Transient,
            _ => GitHubErrorKind::Permanent,
        };
        Self {
            kind,
            status_code: Some(status.as_u16()),
            message,
            source: None,
        }
    }

    /// Creates an error for a status the caller cannot interpret.
    pub fn unexpected_status(status: StatusCode, context: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::UnexpectedStatus,
            status_code: Some(status.as_u16()),
            message: context.into(),
            source: None,
        }
    }

    /// Creates a permanent error without an octocrab source.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an octocrab error.
    ///
    /// Raw requests only fail inside octocrab for transport problems
    /// (connection refused, timeouts, TLS), so the status code is usually
    /// absent and the message decides between transient and permanent.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = match &err {
            octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
            _ => None,
        };
        let message = err.to_string();

        let kind = match status_code {
            Some(429) => GitHubErrorKind::Transient,
            Some(403) if is_rate_limit_error(&message) => GitHubErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
            Some(_) => GitHubErrorKind::Permanent,
            None => {
                if is_network_error(&message) {
                    GitHubErrorKind::Transient
                } else {
                    GitHubErrorKind::Permanent
                }
            }
        };

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Pulls GitHub's `message` field out of an error body, falling back to the
/// raw body text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
