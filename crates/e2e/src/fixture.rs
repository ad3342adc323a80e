//! Scoped browsing contexts
//!
//! A fixture owns one page for one attempt. Acquire it, hand its page
//! models to the scenario, then tear it down on every exit path. Teardown
//! applies the artifact policy and closes the context.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use ghsearch_common::ArtifactPolicy;

use crate::error::{E2eError, E2eResult};
use crate::flow::FlowSettings;
use crate::page::Page;
use crate::pages::Pages;
use crate::playwright::{check_playwright_installed, BridgeConfig, PlaywrightPage};

/// Per-context options decided by the artifact policy
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub video_dir: Option<PathBuf>,
}

/// Opens a fresh browsing context for each attempt
#[async_trait]
pub trait PageProvider: Send + Sync {
    type Page: Page + 'static;

    async fn open(&self, options: &SessionOptions) -> E2eResult<Self::Page>;
}

/// Launches a Playwright bridge per context.
///
/// The installation check runs once, on the first context opened.
pub struct PlaywrightProvider {
    config: BridgeConfig,
    installed: OnceLock<bool>,
}

impl PlaywrightProvider {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            installed: OnceLock::new(),
        }
    }
}

#[async_trait]
impl PageProvider for PlaywrightProvider {
    type Page = PlaywrightPage;

    async fn open(&self, options: &SessionOptions) -> E2eResult<PlaywrightPage> {
        if !*self
            .installed
            .get_or_init(|| check_playwright_installed().is_ok())
        {
            return Err(E2eError::PlaywrightNotFound);
        }
        let config = self.config.clone().with_video_dir(options.video_dir.clone());
        PlaywrightPage::launch(&config).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    Trace,
    Video,
}

/// A file kept from an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

impl Artifact {
    pub fn from_file(kind: ArtifactKind, path: &Path) -> E2eResult<Self> {
        let data = std::fs::read(path)?;
        let mut hasher = Sha256::new();
        hasher.update(&data);
        Ok(Self {
            kind,
            path: path.to_path_buf(),
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// One page plus the policy for what to keep from it
pub struct Fixture<P: Page> {
    page: P,
    settings: FlowSettings,
    policy: ArtifactPolicy,
    artifact_dir: PathBuf,
    tracing: bool,
    torn_down: bool,
}

impl<P: Page> Fixture<P> {
    /// Open a context for attempt `attempt` (0-based), starting a trace if the policy asks for one
    pub async fn acquire<Pr>(
        provider: &Pr,
        settings: FlowSettings,
        policy: ArtifactPolicy,
        artifact_dir: PathBuf,
        attempt: u32,
    ) -> E2eResult<Self>
    where
        Pr: PageProvider<Page = P>,
    {
        std::fs::create_dir_all(&artifact_dir)?;
        let options = SessionOptions {
            video_dir: policy.records_video().then(|| artifact_dir.join("video")),
        };
        let page = provider.open(&options).await?;

        let mut tracing = policy.records_trace(attempt);
        if tracing {
            if let Err(e) = page.start_trace().await {
                warn!("Could not start trace: {}", e);
                tracing = false;
            }
        }

        Ok(Self {
            page,
            settings,
            policy,
            artifact_dir,
            tracing,
            torn_down: false,
        })
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    pub fn pages(&self) -> Pages<'_, P> {
        Pages::new(&self.page, &self.settings)
    }

    /// Capture what the policy keeps for this outcome and close the context.
    ///
    /// Capture failures are logged; they never change the attempt outcome.
    pub async fn teardown(mut self, failed: bool) -> Vec<Artifact> {
        self.torn_down = true;
        let mut artifacts = Vec::new();

        if self.policy.takes_screenshot(failed) {
            let path = self.artifact_dir.join("screenshot.png");
            match self.page.screenshot(&path).await {
                Ok(()) => self.keep(&mut artifacts, ArtifactKind::Screenshot, &path),
                Err(e) => warn!("Screenshot failed: {}", e),
            }
        }

        if self.tracing {
            let path = self
                .policy
                .keeps_trace(failed)
                .then(|| self.artifact_dir.join("trace.zip"));
            match self.page.stop_trace(path.as_deref()).await {
                Ok(()) => {
                    if let Some(path) = &path {
                        self.keep(&mut artifacts, ArtifactKind::Trace, path);
                    }
                }
                Err(e) => warn!("Stopping trace failed: {}", e),
            }
        }

        match self.page.close().await {
            Ok(Some(video)) if self.policy.keeps_video(failed) => {
                self.keep(&mut artifacts, ArtifactKind::Video, &video)
            }
            Ok(Some(video)) => {
                debug!("Discarding video {}", video.display());
                if let Err(e) = std::fs::remove_file(&video) {
                    debug!("Could not remove {}: {}", video.display(), e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Closing page failed: {}", e),
        }

        artifacts
    }

    fn keep(&self, artifacts: &mut Vec<Artifact>, kind: ArtifactKind, path: &Path) {
        match Artifact::from_file(kind, path) {
            Ok(artifact) => {
                debug!("Kept {:?} {}", kind, path.display());
                artifacts.push(artifact);
            }
            Err(e) => debug!("No {:?} at {}: {}", kind, path.display(), e),
        }
    }
}

impl<P: Page> Drop for Fixture<P> {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!(
                "Fixture for {} dropped without teardown",
                self.artifact_dir.display()
            );
        }
    }
}
