//! Response correlation
//!
//! Ties the search request the UI fires to the query that was typed. The
//! subscription is taken when `observe_response_for` returns, so callers
//! must call it before submitting the search and await the handle after.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use ghsearch_common::{SearchQuery, SearchResultPayload};

use crate::error::{E2eError, E2eResult};
use crate::page::{NetworkObservation, Page, ResponseStream};

const SEARCH_ENDPOINT: &str = "/search/users";
const SEARCH_METHOD: &str = "GET";
const SEARCH_QUERY_PARAM: &str = "q";

/// Predicate selecting the search response for a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMatcher {
    /// `host[:port]/path` fragment the response URL must contain
    endpoint: String,
    method: String,
    query_param: String,
}

impl ResponseMatcher {
    pub fn new(endpoint: &str, method: &str, query_param: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            method: method.to_string(),
            query_param: query_param.to_string(),
        }
    }

    /// Matcher for `GET <api>/search/users?q=...`
    pub fn user_search(api_base_url: &str) -> E2eResult<Self> {
        let base = Url::parse(api_base_url).map_err(|e| {
            E2eError::Common(ghsearch_common::Error::InvalidConfig(format!(
                "api_base_url {}: {}",
                api_base_url, e
            )))
        })?;
        let host = base.host_str().unwrap_or_default();
        let authority = match base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let endpoint = format!(
            "{}{}{}",
            authority,
            base.path().trim_end_matches('/'),
            SEARCH_ENDPOINT
        );
        Ok(Self::new(&endpoint, SEARCH_METHOD, SEARCH_QUERY_PARAM))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// True only when endpoint, method, status and query all agree.
    ///
    /// URLs that fail to parse are non-matches.
    pub fn matches(&self, observation: &NetworkObservation, query: &SearchQuery) -> bool {
        if !observation.url.contains(&self.endpoint) {
            return false;
        }
        if !observation.method.eq_ignore_ascii_case(&self.method) {
            return false;
        }
        if observation.status != 200 {
            debug!("Ignoring {} {} for search", observation.status, observation.url);
            return false;
        }

        let url = match Url::parse(&observation.url) {
            Ok(url) => url,
            Err(e) => {
                debug!("Ignoring unparsable response URL {}: {}", observation.url, e);
                return false;
            }
        };

        let submitted = url
            .query_pairs()
            .find(|(key, _)| key == self.query_param.as_str())
            .map(|(_, value)| value.to_lowercase())
            .unwrap_or_default();

        submitted.contains(&query.lowercase())
    }
}

/// Waits for the search response matching a query
#[derive(Debug, Clone)]
pub struct Correlator {
    matcher: ResponseMatcher,
    timeout: Duration,
}

impl Correlator {
    pub fn new(matcher: ResponseMatcher, timeout: Duration) -> Self {
        Self { matcher, timeout }
    }

    /// Begin observing. The returned handle resolves to the matching payload.
    pub fn observe_response_for<P: Page + ?Sized>(
        &self,
        page: &P,
        query: &SearchQuery,
    ) -> PendingResponse {
        debug!(
            "Observing responses for '{}' at {}",
            query,
            self.matcher.endpoint()
        );
        PendingResponse {
            stream: page.observe_responses(),
            matcher: self.matcher.clone(),
            query: query.clone(),
            timeout: self.timeout,
        }
    }
}

/// An armed response observation
#[derive(Debug)]
pub struct PendingResponse {
    stream: ResponseStream,
    matcher: ResponseMatcher,
    query: SearchQuery,
    timeout: Duration,
}

impl PendingResponse {
    /// Wait for the first matching response and parse its body
    pub async fn resolve(self) -> E2eResult<SearchResultPayload> {
        let PendingResponse {
            mut stream,
            matcher,
            query,
            timeout,
        } = self;

        let started = Instant::now();
        let wait = async {
            while let Some(observation) = stream.next().await {
                if matcher.matches(&observation, &query) {
                    return Ok(observation);
                }
            }
            Err(E2eError::Bridge(
                "page closed while waiting for the search response".to_string(),
            ))
        };

        let observation = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(E2eError::CorrelationTimeout {
                    query: query.to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                })
            }
        };

        info!(
            "Correlated search response for '{}': {} ({} ms)",
            query,
            observation.url,
            started.elapsed().as_millis()
        );

        let body = observation
            .json()
            .await
            .map_err(|e| E2eError::InvalidPayload(format!("search response body: {}", e)))?;
        SearchResultPayload::from_value(body).map_err(E2eError::InvalidPayload)
    }
}

impl IntoFuture for PendingResponse {
    type Output = E2eResult<SearchResultPayload>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        self.resolve().boxed()
    }
}
