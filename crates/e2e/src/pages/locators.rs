//! Selectors for the user search page

use crate::page::{AriaRole, Locator, TextPattern};

/// `data-testid` of the search input
pub const SEARCH_BAR_TEST_ID: &str = "search-bar";

/// Text the submit button must contain (case-insensitive)
pub const SEARCH_BUTTON_TEXT: &str = "search";

/// Role under which returned users are rendered
pub const USER_LINK_ROLE: AriaRole = AriaRole::Link;

pub fn search_bar() -> Locator {
    Locator::test_id(SEARCH_BAR_TEST_ID)
}

pub fn search_button() -> Locator {
    Locator::role(AriaRole::Button).with_text(TextPattern::contains(SEARCH_BUTTON_TEXT))
}
