//! Octocrab client wrapper for the calls the snooze relay makes.
//!
//! All requests use HTTP Basic auth with the configured username/token pair
//! and ask for the v3 media type. Requests go through octocrab's raw
//! `_get`/`_patch`/`_post` methods so status codes stay visible: the
//! membership check gives 204 and 404 distinct meanings, and hook
//! registration treats one flavour of 422 as success.

use std::time::Duration;

use http::StatusCode;
use http::header::ACCEPT;
use octocrab::Octocrab;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::GitHubCredentials;
use crate::types::RepoId;

use super::error::{GitHubApiError, error_message};
use super::hooks::{HookOutcome, HookRequest};
use super::models::{Issue, Membership};

/// Media type sent with every request.
pub const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

/// Upper bound on connecting to and reading from GitHub.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Text GitHub puts in a 422 body when the same hook is registered twice.
const HOOK_EXISTS_MESSAGE: &str = "hook already exists";

/// A GitHub API client authenticated as one user.
#[derive(Clone)]
pub struct GitHubClient {
    /// The underlying octocrab client.
    client: Octocrab,
}

impl GitHubClient {
    /// Creates a client for api.github.com.
    pub fn new(credentials: &GitHubCredentials) -> Result<Self, GitHubApiError> {
        Self::build(credentials, None)
    }

    /// Creates a client against a different API root (GitHub Enterprise, or a
    /// mock server in tests).
    pub fn with_base_uri(
        credentials: &GitHubCredentials,
        base_uri: &str,
    ) -> Result<Self, GitHubApiError> {
        Self::build(credentials, Some(base_uri))
    }

    /// Creates a client from a pre-configured Octocrab instance.
    ///
    /// The caller is responsible for authentication and headers.
    pub fn from_octocrab(client: Octocrab) -> Self {
        Self { client }
    }

    fn build(
        credentials: &GitHubCredentials,
        base_uri: Option<&str>,
    ) -> Result<Self, GitHubApiError> {
        crate::tls::install_crypto_provider();

        let mut builder = Octocrab::builder()
            .basic_auth(credentials.username.clone(), credentials.token.clone())
            .add_header(ACCEPT, GITHUB_ACCEPT.to_string())
            .set_connect_timeout(Some(REQUEST_TIMEOUT))
            .set_read_timeout(Some(REQUEST_TIMEOUT));
        if let Some(uri) = base_uri {
            builder = builder.base_uri(uri).map_err(GitHubApiError::from_octocrab)?;
        }
        let client = builder.build().map_err(GitHubApiError::from_octocrab)?;
        Ok(Self { client })
    }

    /// Returns a reference to the underlying octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    /// Fetches an issue by its API url.
    ///
    /// Pull request payloads carry the url of their issue half in
    /// `pull_request.issue_url`; this is how labels are reached from them.
    #[instrument(skip(self))]
    pub async fn get_issue(&self, issue_url: &str) -> Result<Issue, GitHubApiError> {
        let response = self
            .client
            ._get(issue_url)
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        let status = response.status();
        let body = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        if !status.is_success() {
            return Err(GitHubApiError::from_status(status, error_message(&body)));
        }

        serde_json::from_str(&body).map_err(|e| {
            GitHubApiError::permanent_without_source(format!(
                "issue response from {} is not an issue: {}",
                issue_url, e
            ))
        })
    }

    /// Replaces the full label set of an issue.
    ///
    /// GitHub's issue update takes the complete desired set, not a delta, so
    /// callers must pass every label that should remain.
    #[instrument(skip(self))]
    pub async fn replace_labels(
        &self,
        issue_url: &str,
        labels: &[String],
    ) -> Result<(), GitHubApiError> {
        #[derive(Serialize)]
        struct LabelsUpdate<'a> {
            labels: &'a [String],
        }

        let response = self
            .client
            ._patch(issue_url, Some(&LabelsUpdate { labels }))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        let status = response.status();
        let body = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        if !status.is_success() {
            return Err(GitHubApiError::from_status(status, error_message(&body)));
        }

        debug!(issue_url, "Replaced issue labels");
        Ok(())
    }

    /// Checks whether `login` is a member of `org`.
    ///
    /// GitHub answers 204 for members and 404 for non-members; any other
    /// status is reported as `UnexpectedStatus`.
    #[instrument(skip(self))]
    pub async fn check_membership(
        &self,
        org: &str,
        login: &str,
    ) -> Result<Membership, GitHubApiError> {
        let route = format!("/orgs/{}/members/{}", org, login);
        let response = self
            .client
            ._get(route.as_str())
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(Membership::Member),
            StatusCode::NOT_FOUND => Ok(Membership::NotMember),
            status => Err(GitHubApiError::unexpected_status(
                status,
                format!("membership check for {} in {}", login, org),
            )),
        }
    }

    /// Registers a webhook on a repository.
    ///
    /// A 422 saying the hook already exists counts as success so that
    /// provisioning can be re-run against a configured repository.
    #[instrument(skip(self, hook), fields(repo = %repo, events = %hook.events))]
    pub async fn create_hook(
        &self,
        repo: &RepoId,
        hook: &HookRequest,
    ) -> Result<HookOutcome, GitHubApiError> {
        let route = format!("/repos/{}/{}/hooks", repo.owner, repo.repo);
        let response = self
            .client
            ._post(route.as_str(), Some(hook))
            .await
            .map_err(GitHubApiError::from_octocrab)?;
        let status = response.status();
        let body = self
            .client
            .body_to_string(response)
            .await
            .map_err(GitHubApiError::from_octocrab)?;

        if status.is_success() {
            let id = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_u64()))
                .unwrap_or_default();
            return Ok(HookOutcome::Created { id });
        }

        if status == StatusCode::UNPROCESSABLE_ENTITY
            && body.to_lowercase().contains(HOOK_EXISTS_MESSAGE)
        {
            return Ok(HookOutcome::AlreadyExists);
        }

        Err(GitHubApiError::from_status(status, error_message(&body)))
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AwsCredentials;
    use crate::github::{GitHubErrorKind, WebhookEvents};
    use wiremock::matchers::{basic_auth, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GitHubClient {
        let credentials = GitHubCredentials::new("frodo", "baggins");
        GitHubClient::with_base_uri(&credentials, &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn get_issue_uses_basic_auth_and_v3_media_type() {
        let server = MockServer::start().await;
        let issue_url = format!("{}/repos/o/r/issues/1", server.uri());

        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/1"))
            .and(basic_auth("frodo", "baggins"))
            .and(header("accept", GITHUB_ACCEPT))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": issue_url,
                "html_url": "https://github.com/o/r/issues/1",
                "number": 1,
                "labels": [{"name": "snooze"}, {"name": "bug"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let issue = client_for(&server).get_issue(&issue_url).await.unwrap();
        assert_eq!(issue.number, 1);
        assert!(issue.has_label("snooze"));
        assert!(issue.has_label("bug"));
    }

    #[tokio::test]
    async fn get_issue_reports_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues/404"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"message": "Not Found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_issue(&format!("{}/repos/o/r/issues/404", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(404));
        assert_eq!(err.kind, GitHubErrorKind::Permanent);
        assert_eq!(err.message, "Not Found");
    }

    #[tokio::test]
    async fn replace_labels_sends_full_set() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/o/r/issues/2"))
            .and(basic_auth("frodo", "baggins"))
            .and(body_json(serde_json::json!({"labels": ["bug"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .replace_labels(
                &format!("{}/repos/o/r/issues/2", server.uri()),
                &["bug".to_string()],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn replace_labels_propagates_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(serde_json::json!({"message": "Must have push access"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .replace_labels(&format!("{}/repos/o/r/issues/2", server.uri()), &[])
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(403));
        assert_eq!(err.kind, GitHubErrorKind::Permanent);
    }

    #[tokio::test]
    async fn membership_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/shire/members/frodo"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/shire/members/gollum"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orgs/mordor/members/frodo"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(
            client.check_membership("shire", "frodo").await.unwrap(),
            Membership::Member
        );
        assert_eq!(
            client.check_membership("shire", "gollum").await.unwrap(),
            Membership::NotMember
        );

        let err = client.check_membership("mordor", "frodo").await.unwrap_err();
        assert_eq!(err.kind, GitHubErrorKind::UnexpectedStatus);
        assert_eq!(err.status_code, Some(403));
    }

    #[tokio::test]
    async fn create_hook_posts_sns_config() {
        let server = MockServer::start().await;
        let aws = AwsCredentials::new("shire", "precious", "us-west-2");
        let hook = HookRequest::amazon_sns(&aws, "arn:topic", WebhookEvents::single("issue_comment"));

        Mock::given(method("POST"))
            .and(path("/repos/tdsmith/test_repo/hooks"))
            .and(basic_auth("frodo", "baggins"))
            .and(body_json(serde_json::to_value(&hook).unwrap()))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 42})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = client_for(&server)
            .create_hook(&RepoId::new("tdsmith", "test_repo"), &hook)
            .await
            .unwrap();
        assert_eq!(outcome, HookOutcome::Created { id: 42 });
    }

    #[tokio::test]
    async fn create_hook_accepts_existing_hook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/tdsmith/test_repo/hooks"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{"resource": "Hook", "code": "custom",
                            "message": "Hook already exists on this repository"}]
            })))
            .mount(&server)
            .await;

        let aws = AwsCredentials::new("shire", "precious", "us-west-2");
        let hook = HookRequest::amazon_sns(&aws, "arn:topic", WebhookEvents::default());
        let outcome = client_for(&server)
            .create_hook(&RepoId::new("tdsmith", "test_repo"), &hook)
            .await
            .unwrap();
        assert_eq!(outcome, HookOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn create_hook_rejects_other_validation_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "Validation Failed",
                "errors": [{"resource": "Hook", "code": "invalid", "field": "events"}]
            })))
            .mount(&server)
            .await;

        let aws = AwsCredentials::new("shire", "precious", "us-west-2");
        let hook = HookRequest::amazon_sns(&aws, "arn:topic", WebhookEvents::single("bogus"));
        let err = client_for(&server)
            .create_hook(&RepoId::new("tdsmith", "test_repo"), &hook)
            .await
            .unwrap_err();
        assert_eq!(err.status_code, Some(422));
        assert_eq!(err.message, "Validation Failed");
    }
}
