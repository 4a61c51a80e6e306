//! Repository configuration loading.
//!
//! Configuration lives in a TOML file with one table per monitored
//! repository, keyed by its `owner/repo` name. An optional `[default]` table
//! supplies values for any option a repository table leaves out:
//!
//! ```toml
//! [default]
//! github_username = "tdsmith"
//! github_token = "deadbeefcafe"
//! aws_key = "key"
//! aws_secret = "secret"
//! snooze_label = "response needed"
//!
//! ["tdsmith/test_repo"]
//!
//! ["tdsmith/some_other_repository"]
//! snooze_label = "snooze"
//! ignore_members_of = "my-org"
//! ```
//!
//! `github_username`, `github_token`, `aws_key`, `aws_secret` and
//! `snooze_label` must resolve for every repository. `aws_region` defaults to
//! `us-west-2`, `poll_interval` (seconds between long polls) to 0, and
//! `events` to the events the snooze handler understands.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::github::WebhookEvents;
use crate::types::{RepoId, RepoIdError};

/// Name of the table whose values are inherited by every repository.
const DEFAULT_SECTION: &str = "default";

/// Region used when neither the repository nor `[default]` names one.
pub const DEFAULT_AWS_REGION: &str = "us-west-2";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or contains unknown options.
    #[error("invalid config syntax: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required option resolved neither from the section nor `[default]`.
    #[error("no option {option:?} in section {section:?}")]
    MissingOption {
        option: &'static str,
        section: String,
    },

    /// A section name is not a valid `owner/repo` identifier.
    #[error(transparent)]
    InvalidRepository(#[from] RepoIdError),

    /// An option has a value that cannot be used.
    #[error("invalid value for {option:?} in section {section:?}: {reason}")]
    InvalidValue {
        option: &'static str,
        section: String,
        reason: String,
    },

    /// The file configures no repositories.
    #[error("no repositories configured")]
    NoRepositories,
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials for the GitHub REST API (HTTP Basic auth).
#[derive(Clone, PartialEq, Eq)]
pub struct GitHubCredentials {
    pub username: String,
    pub token: String,
}

impl GitHubCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        GitHubCredentials {
            username: username.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for GitHubCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Credentials and region for the AWS channel backend.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub key: String,
    pub secret: String,
    pub region: String,
}

impl AwsCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>, region: impl Into<String>) -> Self {
        AwsCredentials {
            key: key.into(),
            secret: secret.into(),
            region: region.into(),
        }
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// Everything needed to monitor one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// The monitored repository.
    pub repo: RepoId,

    /// GitHub API credentials.
    pub github: GitHubCredentials,

    /// Channel backend credentials and region.
    pub aws: AwsCredentials,

    /// Label whose presence marks an issue as snoozed.
    pub snooze_label: String,

    /// Members of this organization do not clear the snooze label.
    pub exempt_org: Option<String>,

    /// Delay between polls, on top of the long-poll wait.
    pub poll_interval: Duration,

    /// Webhook events the repository pushes to the channel.
    pub events: WebhookEvents,
}

/// One table of the configuration file, before defaults are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSection {
    github_username: Option<String>,
    #[serde(alias = "github_password")]
    github_token: Option<String>,
    aws_key: Option<String>,
    aws_secret: Option<String>,
    aws_region: Option<String>,
    snooze_label: Option<String>,
    ignore_members_of: Option<String>,
    poll_interval: Option<u64>,
    events: Option<WebhookEvents>,
}

/// Reads and parses a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Vec<RepositoryConfig>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}

/// Parses configuration text into one record per repository.
///
/// Repositories are returned sorted by name.
pub fn parse_config(text: &str) -> Result<Vec<RepositoryConfig>> {
    let mut sections: BTreeMap<String, RawSection> = toml::from_str(text)?;
    let defaults = sections.remove(DEFAULT_SECTION).unwrap_or_default();

    if sections.is_empty() {
        return Err(ConfigError::NoRepositories);
    }

    sections
        .into_iter()
        .map(|(name, section)| resolve_section(&name, section, &defaults))
        .collect()
}

fn resolve_section(
    name: &str,
    section: RawSection,
    defaults: &RawSection,
) -> Result<RepositoryConfig> {
    let repo = RepoId::parse(name)?;

    let required = |value: Option<String>, fallback: &Option<String>, option: &'static str| {
        value
            .or_else(|| fallback.clone())
            .ok_or_else(|| ConfigError::MissingOption {
                option,
                section: name.to_string(),
            })
    };

    let github = GitHubCredentials::new(
        required(
            section.github_username,
            &defaults.github_username,
            "github_username",
        )?,
        required(section.github_token, &defaults.github_token, "github_token")?,
    );

    let aws = AwsCredentials::new(
        required(section.aws_key, &defaults.aws_key, "aws_key")?,
        required(section.aws_secret, &defaults.aws_secret, "aws_secret")?,
        section
            .aws_region
            .or_else(|| defaults.aws_region.clone())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
    );

    let snooze_label = required(section.snooze_label, &defaults.snooze_label, "snooze_label")?;
    if snooze_label.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            option: "snooze_label",
            section: name.to_string(),
            reason: "label must not be empty".to_string(),
        });
    }

    let events = section
        .events
        .or_else(|| defaults.events.clone())
        .unwrap_or_default();
    if events.is_empty() {
        return Err(ConfigError::InvalidValue {
            option: "events",
            section: name.to_string(),
            reason: "at least one event is required".to_string(),
        });
    }

    let exempt_org = section
        .ignore_members_of
        .or_else(|| defaults.ignore_members_of.clone())
        .filter(|org| !org.trim().is_empty());

    let poll_interval = section
        .poll_interval
        .or(defaults.poll_interval)
        .unwrap_or(0);

    Ok(RepositoryConfig {
        repo,
        github,
        aws,
        snooze_label,
        exempt_org,
        poll_interval: Duration::from_secs(poll_interval),
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
        ["tdsmith/test_repo"]
        github_username = "tdsmith"
        github_token = "deadbeefcafe"
        aws_key = "key"
        aws_secret = "secret"
        snooze_label = "snooze"
    "#;

    #[test]
    fn parses_single_repository() {
        let configs = parse_config(MINIMAL).unwrap();
        assert_eq!(configs.len(), 1);

        let config = &configs[0];
        assert_eq!(config.repo, RepoId::new("tdsmith", "test_repo"));
        assert_eq!(config.github.username, "tdsmith");
        assert_eq!(config.github.token, "deadbeefcafe");
        assert_eq!(config.aws.region, DEFAULT_AWS_REGION);
        assert_eq!(config.poll_interval, Duration::ZERO);
        assert_eq!(config.exempt_org, None);
        assert_eq!(config.events, WebhookEvents::default());
    }

    #[test]
    fn defaults_section_fills_missing_options() {
        let text = r#"
            [default]
            github_username = "tdsmith"
            github_token = "deadbeefcafe"
            aws_region = "eu-west-1"
            poll_interval = 40
            snooze_label = "response needed"

            ["tdsmith/test_repo"]
            aws_key = "key"
            aws_secret = "secret"

            ["tdsmith/other_repo"]
            github_username = "something_else"
            github_password = "jkljkljkljkl"
            aws_key = "key2"
            aws_secret = "secret2"
            snooze_label = "snooze"
            ignore_members_of = "my-org"
        "#;

        let configs = parse_config(text).unwrap();
        assert_eq!(configs.len(), 2);

        // BTreeMap ordering: other_repo sorts before test_repo.
        let other = &configs[0];
        assert_eq!(other.repo.repo, "other_repo");
        assert_eq!(other.github.username, "something_else");
        assert_eq!(other.github.token, "jkljkljkljkl");
        assert_eq!(other.snooze_label, "snooze");
        assert_eq!(other.exempt_org.as_deref(), Some("my-org"));

        let test = &configs[1];
        assert_eq!(test.github.username, "tdsmith");
        assert_eq!(test.aws.region, "eu-west-1");
        assert_eq!(test.poll_interval, Duration::from_secs(40));
        assert_eq!(test.snooze_label, "response needed");
        assert_eq!(test.exempt_org, None);
    }

    #[test]
    fn missing_required_option_is_an_error() {
        let text = r#"
            ["tdsmith/test_repo"]
            github_username = "tdsmith"
        "#;

        match parse_config(text) {
            Err(ConfigError::MissingOption { option, section }) => {
                assert_eq!(option, "github_token");
                assert_eq!(section, "tdsmith/test_repo");
            }
            other => panic!("expected MissingOption, got {:?}", other),
        }
    }

    #[test]
    fn invalid_repository_name_is_an_error() {
        let text = MINIMAL.replace("tdsmith/test_repo", "not-a-repo");
        assert!(matches!(
            parse_config(&text),
            Err(ConfigError::InvalidRepository(_))
        ));
    }

    #[test]
    fn owner_with_underscore_is_rejected() {
        let text = MINIMAL.replace("tdsmith/test_repo", "a_/b");
        match parse_config(&text) {
            Err(ConfigError::InvalidRepository(err)) => assert_eq!(err.0, "a_/b"),
            other => panic!("expected InvalidRepository, got {:?}", other),
        }
    }

    #[test]
    fn unknown_option_is_rejected() {
        let text = format!("{}\nsnoze_label = \"typo\"\n", MINIMAL);
        assert!(matches!(parse_config(&text), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn events_must_be_a_list() {
        let scalar = format!("{}\nevents = \"issue_comment\"\n", MINIMAL);
        assert!(matches!(parse_config(&scalar), Err(ConfigError::Toml(_))));

        let list = format!("{}\nevents = [\"issue_comment\"]\n", MINIMAL);
        let configs = parse_config(&list).unwrap();
        assert_eq!(configs[0].events.as_slice(), ["issue_comment".to_string()]);

        let empty = format!("{}\nevents = []\n", MINIMAL);
        assert!(matches!(
            parse_config(&empty),
            Err(ConfigError::InvalidValue {
                option: "events",
                ..
            })
        ));
    }

    #[test]
    fn only_defaults_is_an_error() {
        let text = r#"
            [default]
            github_username = "tdsmith"
        "#;
        assert!(matches!(
            parse_config(text),
            Err(ConfigError::NoRepositories)
        ));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let configs = parse_config(MINIMAL).unwrap();
        let debug = format!("{:?}", configs[0]);
        assert!(!debug.contains("deadbeefcafe"));
        assert!(!debug.contains("\"secret\""));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn load_config_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let configs = load_config(file.path()).unwrap();
        assert_eq!(configs[0].repo.to_string(), "tdsmith/test_repo");
    }

    #[test]
    fn load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        match load_config(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
