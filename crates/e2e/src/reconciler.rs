//! UI reconciliation
//!
//! Confirms that the rendered page shows at least one of the identities the
//! search API returned. Candidates are tried against an ordered list of
//! locator strategies; the first visible match wins.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ghsearch_common::{SearchQuery, SearchResultPayload, CANDIDATE_LIMIT};

use crate::error::{E2eError, E2eResult};
use crate::page::{Locator, Page, TextPattern};
use crate::pages::locators::USER_LINK_ROLE;

/// Ways a login can be found on the page, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// A link whose accessible name is exactly the login
    LinkName,
    /// Any element whose visible text contains the login as a word
    VisibleText,
}

impl LocatorStrategy {
    pub const ORDER: [LocatorStrategy; 2] = [LocatorStrategy::LinkName, LocatorStrategy::VisibleText];

    pub fn locator_for(&self, login: &str) -> Locator {
        match self {
            LocatorStrategy::LinkName => {
                Locator::role(USER_LINK_ROLE).with_name(TextPattern::exact(login))
            }
            LocatorStrategy::VisibleText => Locator::text(TextPattern::word(login)),
        }
    }
}

/// Which candidate was found and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub login: String,
    pub strategy: LocatorStrategy,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    strategies: Vec<LocatorStrategy>,
    limit: usize,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            strategies: LocatorStrategy::ORDER.to_vec(),
            limit: CANDIDATE_LIMIT,
        }
    }
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The API must have returned at least one item
    pub fn ensure_results(&self, query: &SearchQuery, payload: &SearchResultPayload) -> E2eResult<()> {
        if payload.is_empty() {
            return Err(E2eError::EmptyResultSet {
                query: query.to_string(),
            });
        }
        Ok(())
    }

    /// Top logins to look for, in payload order
    pub fn candidates(&self, payload: &SearchResultPayload) -> E2eResult<Vec<String>> {
        let logins = payload.candidate_logins(self.limit);
        if logins.is_empty() {
            return Err(E2eError::NoCandidateLogins {
                item_count: payload.items.len(),
            });
        }
        Ok(logins)
    }

    /// Confirm at least one candidate login is visible on `page`
    pub async fn confirm_rendered<P: Page + ?Sized>(
        &self,
        page: &P,
        query: &SearchQuery,
        payload: &SearchResultPayload,
    ) -> E2eResult<Reconciliation> {
        self.ensure_results(query, payload)?;
        let candidates = self.candidates(payload)?;

        for strategy in &self.strategies {
            for login in &candidates {
                let locator = strategy.locator_for(login);
                let visible = page.is_visible(&locator).await.unwrap_or_else(|e| {
                    debug!("Visibility probe {} failed: {}", locator, e);
                    false
                });

                if visible {
                    info!("UI shows '{}' ({:?})", login, strategy);
                    return Ok(Reconciliation {
                        login: login.clone(),
                        strategy: *strategy,
                        candidates,
                    });
                }
            }
        }

        Err(E2eError::NoRenderedMatch { candidates })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::AriaRole;
    use serde_json::json;

    #[test]
    fn test_strategy_locators() {
        assert_eq!(
            LocatorStrategy::LinkName.locator_for("a.b"),
            Locator::role(AriaRole::Link).with_name(TextPattern::exact("a.b"))
        );
        assert_eq!(
            LocatorStrategy::VisibleText.locator_for("a.b"),
            Locator::text(TextPattern::word("a.b"))
        );
    }

    #[test]
    fn test_empty_and_malformed_payloads() {
        let reconciler = Reconciler::new();
        let query = SearchQuery::new("octocat").unwrap();

        let empty = SearchResultPayload::from_value(json!({ "items": [] })).unwrap();
        assert!(matches!(
            reconciler.ensure_results(&query, &empty),
            Err(E2eError::EmptyResultSet { .. })
        ));

        let malformed =
            SearchResultPayload::from_value(json!({ "items": [null, { "id": 1 }] })).unwrap();
        assert!(reconciler.ensure_results(&query, &malformed).is_ok());
        assert!(matches!(
            reconciler.candidates(&malformed),
            Err(E2eError::NoCandidateLogins { item_count: 2 })
        ));
    }
}
