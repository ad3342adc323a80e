//! REST client for the GitHub users endpoints

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use ghsearch_common::{Follower, Identity, Repository, SearchQuery, SearchResultPayload};

use crate::error::{ApiError, ApiResult};

/// Media type requested on every call
pub const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

const CLIENT_USER_AGENT: &str = concat!("ghsearch-e2e/", env!("CARGO_PKG_VERSION"));

/// Status and decoded body of an API call.
///
/// Non-success statuses are reported here rather than raised, so callers can
/// assert on them.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub status: u16,
    pub body: Option<T>,
    /// `message` field of an error body, if any
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Exactly 200, the only status the contract accepts
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Unauthenticated client for the users API
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GithubClient {
    /// Create a client rooted at `base_url` (e.g. `https://api.github.com`)
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_MEDIA_TYPE));
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /search/users?q=<query>`
    pub async fn search_users(&self, query: &SearchQuery) -> ApiResult<ApiResponse<SearchResultPayload>> {
        let mut url = self.endpoint(&["search", "users"])?;
        url.query_pairs_mut().append_pair("q", query.as_str());

        let response = self.get::<Value>(url).await?;
        let body = match response.body {
            Some(value) => Some(SearchResultPayload::from_value(value).map_err(|reason| {
                ApiError::Decode {
                    endpoint: "/search/users".to_string(),
                    reason,
                }
            })?),
            None => None,
        };

        Ok(ApiResponse {
            status: response.status,
            body,
            message: response.message,
        })
    }

    /// `GET /users/<username>`
    pub async fn get_user(&self, username: &str) -> ApiResult<ApiResponse<Identity>> {
        let url = self.endpoint(&["users", username])?;
        self.get(url).await
    }

    /// `GET /users/<username>/repos`
    pub async fn list_repos(&self, username: &str) -> ApiResult<ApiResponse<Vec<Repository>>> {
        let url = self.endpoint(&["users", username, "repos"])?;
        self.get(url).await
    }

    /// `GET /users/<username>/followers`
    pub async fn list_followers(&self, username: &str) -> ApiResult<ApiResponse<Vec<Follower>>> {
        let url = self.endpoint(&["users", username, "followers"])?;
        self.get(url).await
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> ApiResult<ApiResponse<T>> {
        let endpoint = url.path().to_string();
        debug!("GET {}", url);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
            debug!("{} returned {}", endpoint, status);
            return Ok(ApiResponse {
                status: status.as_u16(),
                body: None,
                message,
            });
        }

        let body = serde_json::from_slice::<T>(&bytes).map_err(|e| ApiError::Decode {
            endpoint,
            reason: e.to_string(),
        })?;

        Ok(ApiResponse {
            status: status.as_u16(),
            body: Some(body),
            message: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(200, true, true ; "ok")]
    #[test_case(202, true, false ; "accepted")]
    #[test_case(204, true, false ; "no content")]
    #[test_case(304, false, false ; "not modified")]
    #[test_case(403, false, false ; "rate limited")]
    #[test_case(404, false, false ; "missing user")]
    fn test_success_statuses(status: u16, success: bool, ok: bool) {
        let response: ApiResponse<()> = ApiResponse {
            status,
            body: None,
            message: None,
        };
        assert_eq!(response.is_success(), success);
        assert_eq!(response.is_ok(), ok);
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = GithubClient::new("https://api.github.com", Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["users", "a b/c", "repos"]).unwrap();
        assert_eq!(url.as_str(), "https://api.github.com/users/a%20b%2Fc/repos");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = GithubClient::new("http://127.0.0.1:9000/api/", Duration::from_secs(5)).unwrap();
        let url = client.endpoint(&["search", "users"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/api/search/users");
    }
}
