//! Browser page abstraction
//!
//! Everything the flow needs from a browsing context: navigation, element
//! queries by test id / role / text, element state probes, input actions and
//! a subscription to network responses. `PlaywrightPage` implements it for a
//! real browser; tests use an in-memory page.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;

use crate::error::E2eResult;

/// Characters that may not appear next to a login for it to count as a whole word
const NON_WORD_CLASS: &str = "[^A-Za-z0-9_]";

/// ARIA roles the suite queries by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AriaRole {
    Button,
    Link,
    Textbox,
    Searchbox,
    Heading,
    Img,
    Listitem,
}

impl AriaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AriaRole::Button => "button",
            AriaRole::Link => "link",
            AriaRole::Textbox => "textbox",
            AriaRole::Searchbox => "searchbox",
            AriaRole::Heading => "heading",
            AriaRole::Img => "img",
            AriaRole::Listitem => "listitem",
        }
    }
}

/// A regular expression source shared by the Rust side and the browser side.
///
/// Sources only use syntax that means the same thing in the `regex` crate
/// and in ECMAScript: escaped literals, anchors, non-capturing groups and
/// explicit ASCII character classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPattern {
    source: String,
    ignore_case: bool,
}

impl TextPattern {
    /// Case-insensitive match of the whole string
    pub fn exact(text: &str) -> Self {
        Self {
            source: format!("^{}$", regex::escape(text)),
            ignore_case: true,
        }
    }

    /// Case-insensitive match of `text` as a whole word anywhere in the string
    pub fn word(text: &str) -> Self {
        Self {
            source: format!(
                "(?:^|{class}){text}(?:{class}|$)",
                class = NON_WORD_CLASS,
                text = regex::escape(text)
            ),
            ignore_case: true,
        }
    }

    /// Case-insensitive substring match
    pub fn contains(text: &str) -> Self {
        Self {
            source: regex::escape(text),
            ignore_case: true,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        match RegexBuilder::new(&self.source)
            .case_insensitive(self.ignore_case)
            .build()
        {
            Ok(re) => re.is_match(haystack),
            Err(e) => {
                warn!("Unusable pattern /{}/: {}", self.source, e);
                false
            }
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, if self.ignore_case { "i" } else { "" })
    }
}

/// How to find an element. Always resolves to the first match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Locator {
    TestId {
        value: String,
    },
    Role {
        role: AriaRole,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<TextPattern>,
        #[serde(skip_serializing_if = "Option::is_none")]
        has_text: Option<TextPattern>,
    },
    Text {
        pattern: TextPattern,
    },
}

impl Locator {
    pub fn test_id(value: &str) -> Self {
        Locator::TestId {
            value: value.to_string(),
        }
    }

    pub fn role(role: AriaRole) -> Self {
        Locator::Role {
            role,
            name: None,
            has_text: None,
        }
    }

    pub fn text(pattern: TextPattern) -> Self {
        Locator::Text { pattern }
    }

    /// Restrict a role locator by accessible name
    pub fn with_name(self, pattern: TextPattern) -> Self {
        match self {
            Locator::Role { role, has_text, .. } => Locator::Role {
                role,
                name: Some(pattern),
                has_text,
            },
            other => other,
        }
    }

    /// Restrict a role locator to elements containing matching text
    pub fn with_text(self, pattern: TextPattern) -> Self {
        match self {
            Locator::Role { role, name, .. } => Locator::Role {
                role,
                name,
                has_text: Some(pattern),
            },
            other => other,
        }
    }

    /// Whether an element described by `element` is selected by this locator
    pub fn matches(&self, element: &ElementSnapshot) -> bool {
        match self {
            Locator::TestId { value } => element.test_id.as_deref() == Some(value.as_str()),
            Locator::Role {
                role,
                name,
                has_text,
            } => {
                element.role == Some(*role)
                    && name
                        .as_ref()
                        .map_or(true, |p| p.is_match(&element.accessible_name))
                    && has_text.as_ref().map_or(true, |p| p.is_match(&element.text))
            }
            Locator::Text { pattern } => pattern.is_match(&element.text),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::TestId { value } => write!(f, "getByTestId('{}')", value),
            Locator::Role {
                role,
                name,
                has_text,
            } => {
                write!(f, "getByRole('{}'", role.as_str())?;
                if let Some(name) = name {
                    write!(f, ", name={}", name)?;
                }
                write!(f, ")")?;
                if let Some(text) = has_text {
                    write!(f, ".filter(hasText={})", text)?;
                }
                Ok(())
            }
            Locator::Text { pattern } => write!(f, "getByText({})", pattern),
        }
    }
}

/// The queryable surface of a rendered element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub test_id: Option<String>,
    pub role: Option<AriaRole>,
    pub accessible_name: String,
    pub text: String,
}

type BodyLoader = Arc<dyn Fn() -> BoxFuture<'static, E2eResult<Vec<u8>>> + Send + Sync>;

/// A response seen by the browser. The body is fetched on demand, and the
/// Playwright bridge serves each body only once.
#[derive(Clone)]
pub struct NetworkObservation {
    pub url: String,
    pub method: String,
    pub status: u16,
    body: BodyLoader,
}

impl NetworkObservation {
    pub fn new<F>(url: impl Into<String>, method: impl Into<String>, status: u16, body: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, E2eResult<Vec<u8>>> + Send + Sync + 'static,
    {
        Self {
            url: url.into(),
            method: method.into(),
            status,
            body: Arc::new(body),
        }
    }

    /// An observation whose body is already in memory
    pub fn with_body(
        url: impl Into<String>,
        method: impl Into<String>,
        status: u16,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        let body: Arc<Vec<u8>> = Arc::new(body.into());
        Self::new(url, method, status, move || {
            let body = Arc::clone(&body);
            async move { Ok(body.as_ref().clone()) }.boxed()
        })
    }

    pub async fn body(&self) -> E2eResult<Vec<u8>> {
        (self.body)().await
    }

    pub async fn json(&self) -> E2eResult<serde_json::Value> {
        let bytes = self.body().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl fmt::Debug for NetworkObservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkObservation")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Fan-out point for observed responses
#[derive(Debug, Clone)]
pub struct ResponseHub {
    sender: broadcast::Sender<NetworkObservation>,
}

impl ResponseHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new observer. Responses published after this call are delivered to it.
    pub fn subscribe(&self) -> ResponseStream {
        ResponseStream {
            receiver: self.sender.subscribe(),
        }
    }

    /// Deliver a response to every current observer
    pub fn publish(&self, observation: NetworkObservation) {
        // No observers is the common case between searches.
        let _ = self.sender.send(observation);
    }
}

impl Default for ResponseHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live subscription to network responses
#[derive(Debug)]
pub struct ResponseStream {
    receiver: broadcast::Receiver<NetworkObservation>,
}

impl ResponseStream {
    /// Next observed response, or `None` once the page has gone away
    pub async fn next(&mut self) -> Option<NetworkObservation> {
        loop {
            match self.receiver.recv().await {
                Ok(observation) => return Some(observation),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Response observer lagged, {} response(s) skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Element states that can be asserted before acting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Visible,
    Enabled,
    Editable,
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementState::Visible => write!(f, "visible"),
            ElementState::Enabled => write!(f, "enabled"),
            ElementState::Editable => write!(f, "editable"),
        }
    }
}

/// A browsing context the flow drives
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate to `path`, relative to the configured base URL
    async fn goto(&self, path: &str) -> E2eResult<()>;

    /// Single, non-waiting visibility probe of the first match
    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool>;

    async fn is_enabled(&self, locator: &Locator) -> E2eResult<bool>;

    async fn is_editable(&self, locator: &Locator) -> E2eResult<bool>;

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()>;

    async fn click(&self, locator: &Locator) -> E2eResult<()>;

    /// Type `text` one key at a time with `delay` between keystrokes
    async fn press_sequentially(&self, locator: &Locator, text: &str, delay: Duration)
        -> E2eResult<()>;

    /// Start observing responses. Registration is complete when this returns.
    fn observe_responses(&self) -> ResponseStream;

    async fn screenshot(&self, _path: &Path) -> E2eResult<()> {
        Ok(())
    }

    async fn start_trace(&self) -> E2eResult<()> {
        Ok(())
    }

    /// Stop tracing, writing the trace to `path` or discarding it
    async fn stop_trace(&self, _path: Option<&Path>) -> E2eResult<()> {
        Ok(())
    }

    /// Close the context, returning the recorded video if there is one
    async fn close(&self) -> E2eResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Probe a single element state
pub async fn probe_state<P: Page + ?Sized>(
    page: &P,
    locator: &Locator,
    state: ElementState,
) -> E2eResult<bool> {
    match state {
        ElementState::Visible => page.is_visible(locator).await,
        ElementState::Enabled => page.is_enabled(locator).await,
        ElementState::Editable => page.is_editable(locator).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("a.b+c", "a.b+c", true ; "literal login matches itself")]
    #[test_case("a.b+c", "aXbYc", false ; "dot is not a wildcard")]
    #[test_case("a.b+c", "a.bbbc", false ; "plus is not a quantifier")]
    #[test_case("a.b+c", "A.B+C", true ; "case insensitive")]
    #[test_case("octocat", "octocat2", false ; "anchored at end")]
    #[test_case("octocat", "the octocat", false ; "anchored at start")]
    #[test_case("(x)|y", "y", false ; "alternation is escaped")]
    fn test_exact_pattern(login: &str, name: &str, expected: bool) {
        assert_eq!(TextPattern::exact(login).is_match(name), expected);
    }

    #[test_case("octocat", "Profile of octocat", true ; "word inside sentence")]
    #[test_case("octocat", "OctoCat", true ; "whole text case insensitive")]
    #[test_case("octocat", "octocats", false ; "prefix of longer word")]
    #[test_case("octocat", "my_octocat", false ; "underscore is a word char")]
    #[test_case("octo-cat", "@octo-cat!", true ; "hyphenated login between punctuation")]
    #[test_case("a.b+c", "user aXbYc here", false ; "escaped inside word pattern")]
    fn test_word_pattern(login: &str, text: &str, expected: bool) {
        assert_eq!(TextPattern::word(login).is_match(text), expected);
    }

    #[test]
    fn test_word_pattern_has_no_backspace_escape() {
        let pattern = TextPattern::word("octocat");
        assert!(!pattern.source().contains('\u{8}'));
        assert!(!pattern.source().contains("\\b"));
    }

    #[test]
    fn test_role_locator_matching() {
        let link = ElementSnapshot {
            role: Some(AriaRole::Link),
            accessible_name: "octocat".to_string(),
            text: "octocat".to_string(),
            ..Default::default()
        };
        let locator = Locator::role(AriaRole::Link).with_name(TextPattern::exact("OctoCat"));
        assert!(locator.matches(&link));
        assert!(!Locator::role(AriaRole::Button).matches(&link));
        assert!(Locator::text(TextPattern::word("octocat")).matches(&link));
    }

    #[test]
    fn test_locator_wire_format() {
        let locator = Locator::role(AriaRole::Button).with_text(TextPattern::contains("search"));
        let value = serde_json::to_value(&locator).unwrap();
        assert_eq!(value["kind"], "role");
        assert_eq!(value["role"], "button");
        assert_eq!(value["has_text"]["source"], "search");
        assert_eq!(value["has_text"]["ignore_case"], true);
        assert!(value.get("name").is_none());
    }

    #[tokio::test]
    async fn test_stream_only_sees_responses_after_subscription() {
        let hub = ResponseHub::default();
        hub.publish(NetworkObservation::with_body("https://x/early", "GET", 200, "{}"));

        let mut stream = hub.subscribe();
        hub.publish(NetworkObservation::with_body("https://x/late", "GET", 200, "{\"a\":1}"));

        let seen = stream.next().await.unwrap();
        assert_eq!(seen.url, "https://x/late");
        assert_eq!(seen.json().await.unwrap()["a"], 1);
    }
}
