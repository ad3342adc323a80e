//! Reusable page actions with built-in preconditions

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::page::{probe_state, ElementState, Locator, Page};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the page and asserts element state before every action
pub struct BasePage<'a, P: Page + ?Sized> {
    page: &'a P,
    expect_timeout: Duration,
}

impl<'a, P: Page + ?Sized> BasePage<'a, P> {
    pub fn new(page: &'a P, expect_timeout: Duration) -> Self {
        Self {
            page,
            expect_timeout,
        }
    }

    pub fn page(&self) -> &'a P {
        self.page
    }

    pub fn expect_timeout(&self) -> Duration {
        self.expect_timeout
    }

    pub async fn goto(&self, path: &str) -> E2eResult<()> {
        self.page.goto(path).await
    }

    pub async fn click(&self, target: &Locator, label: &str) -> E2eResult<()> {
        self.expect(target, ElementState::Visible, label).await?;
        self.expect(target, ElementState::Enabled, label).await?;
        self.page.click(target).await
    }

    pub async fn fill(&self, target: &Locator, value: &str, label: &str) -> E2eResult<()> {
        self.expect(target, ElementState::Visible, label).await?;
        self.expect(target, ElementState::Editable, label).await?;
        self.page.fill(target, value).await
    }

    /// Per-keystroke typing, for inputs that react to key events
    pub async fn press_sequentially(
        &self,
        target: &Locator,
        text: &str,
        delay: Duration,
        label: &str,
    ) -> E2eResult<()> {
        self.expect(target, ElementState::Visible, label).await?;
        self.expect(target, ElementState::Editable, label).await?;
        self.page.press_sequentially(target, text, delay).await
    }

    /// Poll until `target` reaches `state` or the expect timeout passes.
    ///
    /// Probe errors count as "not yet".
    pub async fn expect(&self, target: &Locator, state: ElementState, label: &str) -> E2eResult<()> {
        let deadline = Instant::now() + self.expect_timeout;

        loop {
            match probe_state(self.page, target, state).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => debug!("{} {} probe failed: {}", label, state, e),
            }

            if Instant::now() >= deadline {
                return Err(E2eError::PreconditionFailure(format!(
                    "{} should be {} ({})",
                    label, state, target
                )));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}
