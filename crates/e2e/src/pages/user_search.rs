//! Page model for the user search screen

use tracing::info;

use ghsearch_common::SearchQuery;

use crate::error::E2eResult;
use crate::flow::{FlowSettings, SearchControls, SearchFlow, SearchOutcome};
use crate::page::{ElementState, Page};
use crate::pages::base::BasePage;

/// Tests call `search_user`; all assertions happen inside the page model.
pub struct UserSearchPage<'a, P: Page + ?Sized> {
    base: BasePage<'a, P>,
    settings: FlowSettings,
    controls: SearchControls,
}

impl<'a, P: Page + ?Sized> UserSearchPage<'a, P> {
    pub fn new(page: &'a P, settings: FlowSettings) -> Self {
        Self {
            base: BasePage::new(page, settings.expect_timeout),
            settings,
            controls: SearchControls::default(),
        }
    }

    pub fn controls(&self) -> &SearchControls {
        &self.controls
    }

    /// Open the search page and wait until the search bar accepts input
    pub async fn goto(&self) -> E2eResult<()> {
        info!("Opening {}", self.settings.search_path);
        self.base.goto(&self.settings.search_path).await?;
        self.assert_search_bar_interactable().await
    }

    pub async fn assert_search_bar_interactable(&self) -> E2eResult<()> {
        let bar = &self.controls.search_bar;
        self.base.expect(bar, ElementState::Visible, "Search bar").await?;
        self.base.expect(bar, ElementState::Enabled, "Search bar").await?;
        self.base.expect(bar, ElementState::Editable, "Search bar").await
    }

    pub async fn assert_search_button_ready(&self) -> E2eResult<()> {
        let button = &self.controls.search_button;
        self.base.expect(button, ElementState::Visible, "Search button").await?;
        self.base.expect(button, ElementState::Enabled, "Search button").await
    }

    /// Type the query one key at a time instead of filling it
    pub async fn type_query(&self, query: &SearchQuery, delay: std::time::Duration) -> E2eResult<()> {
        self.base
            .press_sequentially(&self.controls.search_bar, query.as_str(), delay, "Search bar")
            .await
    }

    /// Search, then verify both the API response and the rendered results
    pub async fn search_user(&self, query: &SearchQuery) -> E2eResult<SearchOutcome> {
        let mut flow = SearchFlow::with_controls(self.base.page(), &self.settings, self.controls.clone());
        flow.run(query).await
    }
}
