//! Page models handed to scenarios

pub mod base;
pub mod locators;
pub mod user_search;

use crate::flow::FlowSettings;
use crate::page::Page;

pub use base::BasePage;
pub use user_search::UserSearchPage;

/// Every page model for one browsing context
pub struct Pages<'a, P: Page + ?Sized> {
    pub user_search: UserSearchPage<'a, P>,
}

impl<'a, P: Page + ?Sized> Pages<'a, P> {
    pub fn new(page: &'a P, settings: &FlowSettings) -> Self {
        Self {
            user_search: UserSearchPage::new(page, settings.clone()),
        }
    }
}
