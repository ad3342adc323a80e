//! Contract checks over the users API
//!
//! Each check verifies status and shape of one endpoint for a given user.
//! Conditions worth reporting but not worth failing on (an account without
//! followers, an account without repositories) are recorded as annotations.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ghsearch_common::{SearchQuery, CANDIDATE_LIMIT};

use crate::client::{ApiResponse, GithubClient};
use crate::error::{ApiError, ApiResult};

/// A non-failing observation attached to a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Annotation {
    pub fn new(kind: &str, description: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.into(),
        }
    }
}

/// Outcome of a successful contract run for one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractReport {
    pub username: String,
    pub login: String,
    pub repo_count: usize,
    pub follower_count: usize,
    pub annotations: Vec<Annotation>,
}

impl ContractReport {
    pub fn has_annotation(&self, kind: &str) -> bool {
        self.annotations.iter().any(|a| a.kind == kind)
    }
}

/// Runs the user contract against a live (or mocked) API
pub struct ContractChecker<'a> {
    client: &'a GithubClient,
}

impl<'a> ContractChecker<'a> {
    pub fn new(client: &'a GithubClient) -> Self {
        Self { client }
    }

    /// Check user lookup, repository listing and follower listing for `username`
    pub async fn check_user(&self, username: &str) -> ApiResult<ContractReport> {
        let mut annotations = Vec::new();

        let user = self.client.get_user(username).await?;
        let user = require_success("user lookup", username, user)?;
        if !user.login.eq_ignore_ascii_case(username) {
            return Err(violation(
                "user lookup",
                username,
                format!("login mismatch: got {}", user.login),
            ));
        }

        let repos = self.client.list_repos(username).await?;
        let repos = require_success("repository listing", username, repos)?;
        if let Some(foreign) = repos
            .iter()
            .find(|repo| !repo.owner.login.eq_ignore_ascii_case(username))
        {
            return Err(violation(
                "repository listing",
                username,
                format!("repository {} is owned by {}", foreign.name, foreign.owner.login),
            ));
        }
        if repos.is_empty() {
            annotations.push(Annotation::new(
                "no-repos",
                format!("{} has no public repositories", user.login),
            ));
        }

        let followers = self.client.list_followers(username).await?;
        let followers = require_success("follower listing", username, followers)?;
        if followers.iter().any(|f| f.login.is_empty()) {
            return Err(violation(
                "follower listing",
                username,
                "follower entry without a login".to_string(),
            ));
        }
        if followers.is_empty() {
            info!("{} has no followers", user.login);
            annotations.push(Annotation::new(
                "no-followers",
                format!("{} has no followers", user.login),
            ));
        }

        Ok(ContractReport {
            username: username.to_string(),
            login: user.login,
            repo_count: repos.len(),
            follower_count: followers.len(),
            annotations,
        })
    }

    /// Search and return the top candidate logins; the search must succeed
    pub async fn search_logins(&self, query: &SearchQuery) -> ApiResult<Vec<String>> {
        let response = self.client.search_users(query).await?;
        let payload = require_success("user search", query.as_str(), response)?;
        Ok(payload.candidate_logins(CANDIDATE_LIMIT))
    }
}

fn require_success<T>(check: &str, username: &str, response: ApiResponse<T>) -> ApiResult<T> {
    if !response.is_ok() {
        warn!("{} for {} returned {}", check, username, response.status);
        return Err(violation(
            check,
            username,
            format!(
                "expected status 200, got {}{}",
                response.status,
                response
                    .message
                    .map(|m| format!(" ({})", m))
                    .unwrap_or_default()
            ),
        ));
    }

    response
        .body
        .ok_or_else(|| violation(check, username, "missing response body".to_string()))
}

fn violation(check: &str, username: &str, detail: String) -> ApiError {
    ApiError::Contract {
        check: check.to_string(),
        username: username.to_string(),
        detail,
    }
}
