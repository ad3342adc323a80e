//! Error types for the end-to-end flow

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// An input or control was not interactable when the flow needed it
    #[error("Precondition failed: {0}")]
    PreconditionFailure(String),

    /// No network response matched the search within the wait bound
    #[error("No matching search response for '{query}' within {waited_ms} ms")]
    CorrelationTimeout { query: String, waited_ms: u64 },

    /// The API answered but returned zero users
    #[error("Expected at least 1 user result for query: {query}")]
    EmptyResultSet { query: String },

    /// Items were returned but none carried a usable login
    #[error("No logins to validate in UI among {item_count} returned item(s)")]
    NoCandidateLogins { item_count: usize },

    /// The UI never showed any of the candidate logins
    #[error("UI did not display any of the top returned users: {}", .candidates.join(", "))]
    NoRenderedMatch { candidates: Vec<String> },

    #[error("Invalid search payload: {0}")]
    InvalidPayload(String),

    #[error("UI and API disagree for '{query}': UI showed [{}], API returned [{}]", .ui.join(", "), .api.join(", "))]
    CrossCheckMismatch {
        query: String,
        ui: Vec<String>,
        api: Vec<String>,
    },

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright bridge error: {0}")]
    Bridge(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("API error: {0}")]
    Api(#[from] ghsearch_api::ApiError),

    #[error(transparent)]
    Common(#[from] ghsearch_common::Error),
}

impl E2eError {
    /// Short machine-readable category used in results
    pub fn kind(&self) -> &'static str {
        match self {
            E2eError::PreconditionFailure(_) => "precondition_failure",
            E2eError::CorrelationTimeout { .. } => "correlation_timeout",
            E2eError::EmptyResultSet { .. } => "empty_result_set",
            E2eError::NoCandidateLogins { .. } => "no_candidate_logins",
            E2eError::NoRenderedMatch { .. } => "no_rendered_match",
            E2eError::InvalidPayload(_) => "invalid_payload",
            E2eError::CrossCheckMismatch { .. } => "cross_check_mismatch",
            E2eError::PlaywrightNotFound | E2eError::Bridge(_) => "bridge",
            E2eError::Timeout(_) => "timeout",
            E2eError::ScenarioParse(_) | E2eError::Yaml(_) => "scenario",
            E2eError::Api(_) => "api",
            E2eError::Io(_) | E2eError::Json(_) | E2eError::Common(_) => "internal",
        }
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
