//! UI/API cross-check
//!
//! Runs the UI search, asks the API the same question directly, and
//! requires the two to agree on who the top results are.

use serde::{Deserialize, Serialize};
use tracing::info;

use ghsearch_api::ContractChecker;
use ghsearch_common::SearchQuery;

use crate::error::{E2eError, E2eResult};
use crate::flow::SearchOutcome;
use crate::page::Page;
use crate::pages::UserSearchPage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossCheckReport {
    pub query: SearchQuery,
    /// Login the UI was confirmed to show
    pub rendered_login: String,
    /// Top logins from the response the UI received
    pub ui_logins: Vec<String>,
    /// Top logins from a direct API call
    pub api_logins: Vec<String>,
}

/// Run the UI search for `query` and compare it with a direct API search
pub async fn verify_against_api<P: Page + ?Sized>(
    user_search: &UserSearchPage<'_, P>,
    checker: &ContractChecker<'_>,
    query: &SearchQuery,
) -> E2eResult<CrossCheckReport> {
    let outcome = user_search.search_user(query).await?;
    let api_logins = checker.search_logins(query).await?;
    compare(&outcome, api_logins)
}

/// The rendered login must be among the API's top results
pub fn compare(outcome: &SearchOutcome, api_logins: Vec<String>) -> E2eResult<CrossCheckReport> {
    let rendered = &outcome.reconciliation.login;
    let ui_logins = outcome.reconciliation.candidates.clone();

    if !api_logins.iter().any(|login| login.eq_ignore_ascii_case(rendered)) {
        return Err(E2eError::CrossCheckMismatch {
            query: outcome.query.to_string(),
            ui: ui_logins,
            api: api_logins,
        });
    }

    info!(
        "Cross-check for '{}' agrees on '{}'",
        outcome.query, rendered
    );
    Ok(CrossCheckReport {
        query: outcome.query.clone(),
        rendered_login: rendered.clone(),
        ui_logins,
        api_logins,
    })
}
