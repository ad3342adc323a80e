//! GH Users Search end-to-end suite
//!
//! Drives the search page through a browser, correlates the search request
//! the page fires with the query that was typed, and confirms that users
//! from the API response are rendered.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   SuiteRunner (retries, results)            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fixture (per attempt)                                      │
//! │    ├── PageProvider::open() -> Page (Playwright bridge)     │
//! │    ├── pages() -> Pages { user_search }                     │
//! │    └── teardown(failed) -> screenshot / trace / video       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UserSearchPage::search_user(query)                         │
//! │    └── SearchFlow                                           │
//! │          ├── BasePage::expect (input, submit control)       │
//! │          ├── Correlator::observe_response_for (pre-submit)  │
//! │          └── Reconciler::confirm_rendered (link, then text) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (YAML): ui_search | api_contract | cross_check    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod correlator;
pub mod cross_check;
pub mod error;
pub mod fixture;
pub mod flow;
pub mod page;
pub mod pages;
pub mod playwright;
pub mod reconciler;
pub mod runner;
pub mod scenario;

pub use correlator::{Correlator, PendingResponse, ResponseMatcher};
pub use error::{E2eError, E2eResult};
pub use fixture::{Artifact, ArtifactKind, Fixture, PageProvider, PlaywrightProvider, SessionOptions};
pub use flow::{FlowSettings, FlowState, SearchFlow, SearchOutcome};
pub use page::{
    AriaRole, ElementSnapshot, ElementState, Locator, NetworkObservation, Page, ResponseHub,
    ResponseStream, TextPattern,
};
pub use pages::{Pages, UserSearchPage};
pub use playwright::{BridgeConfig, PlaywrightPage};
pub use reconciler::{LocatorStrategy, Reconciler, Reconciliation};
pub use runner::{ScenarioReport, SuiteRunner, TestResult, TestStatus, TestSuiteResult};
pub use scenario::{Scenario, ScenarioKind};
