//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different string identifiers
//! (e.g., passing a message ID where a receipt handle is expected) and make
//! the code more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Prefix for queue names, so snooze queues are recognisable in the account.
const QUEUE_PREFIX: &str = "snooze__";

/// Error returned when a repository name is not in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository name {0:?}: expected owner/repo")]
pub struct RepoIdError(pub String);

/// A repository identifier (owner/repo format).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RepoId {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses an `owner/repo` string.
    ///
    /// The owner follows GitHub's login rules: ASCII letters and digits,
    /// with single hyphens only between them. The repository name may use
    /// ASCII letters, digits, `-`, `_` and `.`, and cannot be `.` or `..`.
    pub fn parse(s: &str) -> Result<Self, RepoIdError> {
        match s.split_once('/') {
            Some((owner, repo)) if is_valid_owner(owner) && is_valid_repo_name(repo) => {
                Ok(RepoId::new(owner, repo))
            }
            _ => Err(RepoIdError(s.to_string())),
        }
    }

    /// Returns the name used for the SNS topic bound to this repository.
    ///
    /// The `/` separator is not valid in topic or queue names, so it is
    /// replaced with a double underscore: `owner/repo` becomes `owner__repo`.
    /// Owners never contain `_`, so the first underscore always starts the
    /// separator and distinct parsed repositories get distinct names.
    pub fn canonical_name(&self) -> String {
        format!("{}__{}", self.owner, self.repo)
    }

    /// Returns the name of the SQS queue bound to this repository.
    pub fn queue_name(&self) -> String {
        format!("{}{}", QUEUE_PREFIX, self.canonical_name())
    }
}

fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && !owner.starts_with('-')
        && !owner.ends_with('-')
        && !owner.contains("--")
        && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_valid_repo_name(repo: &str) -> bool {
    !repo.is_empty()
        && repo != "."
        && repo != ".."
        && repo
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Channel-assigned identifier of a received message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        MessageId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token that acknowledges (deletes) one delivery of a message.
///
/// Every receive of the same message yields a fresh handle; only the handle
/// from the most recent receive is guaranteed to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn new(s: impl Into<String>) -> Self {
        ReceiptHandle(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Receipt handles are long; the prefix is enough to correlate logs.
        write!(f, "{}", self.0.get(..16).unwrap_or(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod repo_id {
        use super::*;
        use proptest::prelude::*;

        const OWNER: &str = "[a-zA-Z0-9]([a-zA-Z0-9]|-[a-zA-Z0-9]){0,18}";

        proptest! {
            #[test]
            fn serde_roundtrip(
                owner in OWNER,
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let id = RepoId::new(&owner, &repo);
                let json = serde_json::to_string(&id).unwrap();
                let parsed: RepoId = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(id, parsed);
            }

            #[test]
            fn parse_inverts_display(
                owner in OWNER,
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let id = RepoId::new(&owner, &repo);
                prop_assert_eq!(RepoId::parse(&id.to_string()).unwrap(), id);
            }

            #[test]
            fn canonical_name_has_no_separator(
                owner in OWNER,
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let id = RepoId::new(&owner, &repo);
                prop_assert!(!id.canonical_name().contains('/'));
                prop_assert_eq!(id.canonical_name(), format!("{}__{}", owner, repo));
            }

            #[test]
            fn canonical_name_is_stable(
                owner in OWNER,
                repo in "[a-zA-Z][a-zA-Z0-9_.-]{0,99}"
            ) {
                let a = RepoId::new(&owner, &repo);
                let b = RepoId::parse(&format!("{}/{}", owner, repo)).unwrap();
                prop_assert_eq!(a.queue_name(), b.queue_name());
            }

            #[test]
            fn distinct_repositories_get_distinct_queues(
                owner_a in OWNER,
                repo_a in "[a-zA-Z0-9_.-]{1,12}",
                owner_b in OWNER,
                repo_b in "[a-zA-Z0-9_.-]{1,12}"
            ) {
                let parsed = (
                    RepoId::parse(&format!("{}/{}", owner_a, repo_a)),
                    RepoId::parse(&format!("{}/{}", owner_b, repo_b)),
                );
                if let (Ok(a), Ok(b)) = parsed {
                    prop_assert_eq!(a == b, a.queue_name() == b.queue_name());
                    prop_assert_eq!(a == b, a.canonical_name() == b.canonical_name());
                }
            }
        }

        #[test]
        fn underscores_cannot_merge_two_repositories() {
            assert!(RepoId::parse("a_/b").is_err());
            let id = RepoId::parse("a/_b").unwrap();
            assert_eq!(id.canonical_name(), "a___b");
        }

        #[test]
        fn owner_follows_login_rules() {
            assert!(RepoId::parse("my-org/repo").is_ok());
            assert!(RepoId::parse("-org/repo").is_err());
            assert!(RepoId::parse("org-/repo").is_err());
            assert!(RepoId::parse("my--org/repo").is_err());
            assert!(RepoId::parse("my org/repo").is_err());
        }

        #[test]
        fn repo_name_charset() {
            assert!(RepoId::parse("owner/my.repo-name_2").is_ok());
            assert!(RepoId::parse("owner/.").is_err());
            assert!(RepoId::parse("owner/..").is_err());
            assert!(RepoId::parse("owner/has space").is_err());
        }

        #[test]
        fn canonical_and_queue_names() {
            let id = RepoId::parse("tdsmith/test_repo").unwrap();
            assert_eq!(id.canonical_name(), "tdsmith__test_repo");
            assert_eq!(id.queue_name(), "snooze__tdsmith__test_repo");
        }

        #[test]
        fn parse_rejects_malformed_names() {
            assert!(RepoId::parse("no-separator").is_err());
            assert!(RepoId::parse("/repo").is_err());
            assert!(RepoId::parse("owner/").is_err());
            assert!(RepoId::parse("a/b/c").is_err());
        }
    }

    #[test]
    fn receipt_handle_display_is_truncated() {
        let handle = ReceiptHandle::new("a".repeat(200));
        assert_eq!(handle.to_string().len(), 16);
        assert_eq!(ReceiptHandle::new("short").to_string(), "short");
    }
}
