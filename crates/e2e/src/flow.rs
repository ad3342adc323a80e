//! Search flow orchestration
//!
//! ```text
//! Idle -> Ready -> Submitted -> Correlated -> Reconciled
//!   \________\__________\___________\______> Failed(reason)
//! ```
//!
//! Every step either advances the state or fails the whole flow. There is
//! no retry here; retries belong to the runner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use ghsearch_common::{SearchQuery, SearchResultPayload, SuiteConfig};

use crate::correlator::{Correlator, ResponseMatcher};
use crate::error::E2eResult;
use crate::page::{ElementState, Locator, Page};
use crate::pages::base::BasePage;
use crate::pages::locators;
use crate::reconciler::{Reconciler, Reconciliation};

/// Timeouts and matching rules for one search flow
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub search_path: String,
    pub expect_timeout: Duration,
    pub response_timeout: Duration,
    pub matcher: ResponseMatcher,
}

impl FlowSettings {
    pub fn from_config(config: &SuiteConfig) -> E2eResult<Self> {
        Ok(Self {
            search_path: config.search_path.clone(),
            expect_timeout: config.expect_timeout(),
            response_timeout: config.response_timeout(),
            matcher: ResponseMatcher::user_search(&config.api_base_url)?,
        })
    }
}

/// Search input and submit control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchControls {
    pub search_bar: Locator,
    pub search_button: Locator,
}

impl Default for SearchControls {
    fn default() -> Self {
        Self {
            search_bar: locators::search_bar(),
            search_button: locators::search_button(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FlowState {
    Idle,
    /// Input and submit control verified
    Ready,
    /// Query filled, observation armed, search submitted
    Submitted,
    /// Matching response received
    Correlated,
    /// UI shows a returned user
    Reconciled,
    Failed(String),
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowState::Idle => write!(f, "idle"),
            FlowState::Ready => write!(f, "ready"),
            FlowState::Submitted => write!(f, "submitted"),
            FlowState::Correlated => write!(f, "correlated"),
            FlowState::Reconciled => write!(f, "reconciled"),
            FlowState::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Result of a successful search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: SearchQuery,
    pub payload: SearchResultPayload,
    pub reconciliation: Reconciliation,
    pub states: Vec<FlowState>,
}

/// One search attempt against one page
pub struct SearchFlow<'a, P: Page + ?Sized> {
    base: BasePage<'a, P>,
    controls: SearchControls,
    correlator: Correlator,
    reconciler: Reconciler,
    history: Vec<FlowState>,
}

impl<'a, P: Page + ?Sized> SearchFlow<'a, P> {
    pub fn new(page: &'a P, settings: &FlowSettings) -> Self {
        Self::with_controls(page, settings, SearchControls::default())
    }

    pub fn with_controls(page: &'a P, settings: &FlowSettings, controls: SearchControls) -> Self {
        Self {
            base: BasePage::new(page, settings.expect_timeout),
            controls,
            correlator: Correlator::new(settings.matcher.clone(), settings.response_timeout),
            reconciler: Reconciler::new(),
            history: vec![FlowState::Idle],
        }
    }

    pub fn state(&self) -> &FlowState {
        self.history.last().unwrap_or(&FlowState::Idle)
    }

    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Run the flow to completion, recording `Failed` on the first error
    pub async fn run(&mut self, query: &SearchQuery) -> E2eResult<SearchOutcome> {
        let result = self.drive(query).await;
        match result {
            Ok((payload, reconciliation)) => Ok(SearchOutcome {
                query: query.clone(),
                payload,
                reconciliation,
                states: self.history.clone(),
            }),
            Err(e) => {
                warn!("Search for '{}' failed in state {}: {}", query, self.state(), e);
                self.transition(FlowState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn drive(&mut self, query: &SearchQuery) -> E2eResult<(SearchResultPayload, Reconciliation)> {
        let page = self.base.page();

        self.base
            .expect(&self.controls.search_bar, ElementState::Visible, "Search bar")
            .await?;
        self.base
            .expect(&self.controls.search_bar, ElementState::Enabled, "Search bar")
            .await?;
        self.base
            .expect(&self.controls.search_bar, ElementState::Editable, "Search bar")
            .await?;
        self.base
            .expect(&self.controls.search_button, ElementState::Visible, "Search button")
            .await?;
        self.base
            .expect(&self.controls.search_button, ElementState::Enabled, "Search button")
            .await?;
        self.transition(FlowState::Ready);

        page.fill(&self.controls.search_bar, query.as_str()).await?;
        let pending = self.correlator.observe_response_for(page, query);
        page.click(&self.controls.search_button).await?;
        self.transition(FlowState::Submitted);

        let payload = pending.await?;
        self.transition(FlowState::Correlated);

        self.reconciler.ensure_results(query, &payload)?;
        let reconciliation = self
            .reconciler
            .confirm_rendered(page, query, &payload)
            .await?;
        self.transition(FlowState::Reconciled);

        info!(
            "Search for '{}' reconciled on '{}'",
            query, reconciliation.login
        );
        Ok((payload, reconciliation))
    }

    fn transition(&mut self, next: FlowState) {
        debug!("flow: {} -> {}", self.state(), next);
        self.history.push(next);
    }
}
