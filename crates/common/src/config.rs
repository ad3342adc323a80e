//! Suite configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

/// Upper bound on `retries` accepted by `validate`
pub const MAX_RETRIES: u32 = 10;

/// Suite configuration, loaded from TOML and overridden from the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Path of the search page, relative to `base_url`
    pub search_path: String,

    /// Base URL of the REST API backing the application
    pub api_base_url: String,

    /// Extra attempts per scenario after a failure
    pub retries: u32,

    /// Bound for a whole scenario attempt
    pub test_timeout_ms: u64,

    /// Bound for each auto-retrying assertion
    pub expect_timeout_ms: u64,

    /// Bound for waiting on the search API response
    pub response_timeout_ms: u64,

    /// Directory with scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Directory for results and artifacts
    pub output_dir: PathBuf,

    /// Browser launch settings
    pub browser: BrowserSettings,

    /// What to capture when an attempt fails
    pub artifacts: ArtifactPolicy,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gh-users-search.netlify.app".to_string(),
            search_path: "/user".to_string(),
            api_base_url: "https://api.github.com".to_string(),
            retries: 1,
            test_timeout_ms: 30_000,
            expect_timeout_ms: 7_000,
            response_timeout_ms: 15_000,
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
            browser: BrowserSettings::default(),
            artifacts: ArtifactPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            other => Err(Error::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub kind: BrowserKind,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Bound for individual bridge commands (fill, click, navigation)
    pub action_timeout_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            kind: BrowserKind::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    Off,
    On,
    #[default]
    OnFirstRetry,
    RetainOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotMode {
    Off,
    On,
    #[default]
    OnlyOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    Off,
    On,
    #[default]
    RetainOnFailure,
}

/// Artifact capture policy for scenario attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPolicy {
    pub trace: TraceMode,
    pub screenshot: ScreenshotMode,
    pub video: VideoMode,
}

impl ArtifactPolicy {
    /// Whether tracing should be recorded for the given attempt (0-based)
    pub fn records_trace(&self, attempt: u32) -> bool {
        match self.trace {
            TraceMode::Off => false,
            TraceMode::On | TraceMode::RetainOnFailure => true,
            TraceMode::OnFirstRetry => attempt == 1,
        }
    }

    /// Whether a recorded trace is kept once the attempt finished
    pub fn keeps_trace(&self, failed: bool) -> bool {
        match self.trace {
            TraceMode::Off => false,
            TraceMode::On | TraceMode::OnFirstRetry => true,
            TraceMode::RetainOnFailure => failed,
        }
    }

    pub fn takes_screenshot(&self, failed: bool) -> bool {
        match self.screenshot {
            ScreenshotMode::Off => false,
            ScreenshotMode::On => true,
            ScreenshotMode::OnlyOnFailure => failed,
        }
    }

    pub fn records_video(&self) -> bool {
        self.video != VideoMode::Off
    }

    pub fn keeps_video(&self, failed: bool) -> bool {
        match self.video {
            VideoMode::Off => false,
            VideoMode::On => true,
            VideoMode::RetainOnFailure => failed,
        }
    }
}

impl SuiteConfig {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            debug!("Loading suite config from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `GHSEARCH_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("GHSEARCH_BASE_URL") {
            self.base_url = url;
        }
        if let Some(url) = lookup("GHSEARCH_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(retries) = lookup("GHSEARCH_RETRIES") {
            self.retries = retries.parse().map_err(|_| {
                Error::InvalidConfig(format!("GHSEARCH_RETRIES is not a number: {}", retries))
            })?;
        }
        if let Some(headless) = lookup("GHSEARCH_HEADLESS") {
            self.browser.headless = match headless.as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => {
                    return Err(Error::InvalidConfig(format!(
                        "GHSEARCH_HEADLESS must be a boolean, got {}",
                        other
                    )))
                }
            };
        }
        Ok(())
    }

    /// Check that URLs parse and timeouts are usable
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("base_url", &self.base_url), ("api_base_url", &self.api_base_url)] {
            url::Url::parse(value)
                .map_err(|e| Error::InvalidConfig(format!("{} is not a valid URL ({}): {}", name, value, e)))?;
        }

        if !self.search_path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "search_path must start with '/': {}",
                self.search_path
            )));
        }

        for (name, value) in [
            ("test_timeout_ms", self.test_timeout_ms),
            ("expect_timeout_ms", self.expect_timeout_ms),
            ("response_timeout_ms", self.response_timeout_ms),
            ("browser.action_timeout_ms", self.browser.action_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be greater than zero", name)));
            }
        }

        if self.retries > MAX_RETRIES {
            return Err(Error::InvalidConfig(format!(
                "retries ({}) exceeds the maximum of {}",
                self.retries, MAX_RETRIES
            )));
        }

        if self.expect_timeout_ms > self.test_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "expect_timeout_ms ({}) exceeds test_timeout_ms ({})",
                self.expect_timeout_ms, self.test_timeout_ms
            )));
        }

        Ok(())
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn expect_timeout(&self) -> Duration {
        Duration::from_millis(self.expect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.browser.action_timeout_ms)
    }

    /// Directory for screenshots, traces and videos
    pub fn artifacts_dir(&self) -> PathBuf {
        self.output_dir.join("artifacts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    #[test]
    fn test_defaults_match_runner_settings() {
        let config = SuiteConfig::default();
        assert_eq!(config.retries, 1);
        assert_eq!(config.test_timeout(), Duration::from_secs(30));
        assert_eq!(config.expect_timeout(), Duration::from_secs(7));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SuiteConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SuiteConfig::default());
    }

    #[test]
    fn test_save_then_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        std::fs::write(
            &path,
            r#"
base_url = "http://127.0.0.1:5173"
retries = 3

[artifacts]
video = "off"
"#,
        )
        .unwrap();

        let config = SuiteConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:5173");
        assert_eq!(config.retries, 3);
        assert_eq!(config.artifacts.video, VideoMode::Off);
        assert_eq!(config.artifacts.screenshot, ScreenshotMode::OnlyOnFailure);

        config.save(&path).unwrap();
        assert_eq!(SuiteConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("GHSEARCH_BASE_URL", "http://localhost:3000"),
            ("GHSEARCH_RETRIES", "0"),
            ("GHSEARCH_HEADLESS", "false"),
        ]
        .into_iter()
        .collect();

        let mut config = SuiteConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.retries, 0);
        assert!(!config.browser.headless);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = SuiteConfig::default();
        let result = config.apply_overrides(|key| {
            (key == "GHSEARCH_RETRIES").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SuiteConfig::default();
        config.api_base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        let mut config = SuiteConfig::default();
        config.expect_timeout_ms = 60_000;
        assert!(config.validate().is_err());

        let mut config = SuiteConfig::default();
        config.response_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test_case(0, true ; "no retries")]
    #[test_case(MAX_RETRIES, true ; "at the cap")]
    #[test_case(MAX_RETRIES + 1, false ; "above the cap")]
    #[test_case(u32::MAX, false ; "u32 max")]
    fn test_validate_retry_bound(retries: u32, valid: bool) {
        let config = SuiteConfig {
            retries,
            ..Default::default()
        };
        assert_eq!(config.validate().is_ok(), valid);
    }

    #[test_case(TraceMode::OnFirstRetry, 0, false ; "first retry skips initial attempt")]
    #[test_case(TraceMode::OnFirstRetry, 1, true ; "first retry records retry")]
    #[test_case(TraceMode::OnFirstRetry, 2, false ; "first retry skips later retries")]
    #[test_case(TraceMode::On, 0, true ; "on always records")]
    #[test_case(TraceMode::Off, 1, false ; "off never records")]
    fn test_trace_recording(mode: TraceMode, attempt: u32, expected: bool) {
        let policy = ArtifactPolicy {
            trace: mode,
            ..Default::default()
        };
        assert_eq!(policy.records_trace(attempt), expected);
    }

    #[test]
    fn test_default_policy_retention() {
        let policy = ArtifactPolicy::default();
        assert!(policy.takes_screenshot(true));
        assert!(!policy.takes_screenshot(false));
        assert!(policy.records_video());
        assert!(policy.keeps_video(true));
        assert!(!policy.keeps_video(false));
    }

    #[test]
    fn test_browser_kind_parse() {
        assert_eq!("Firefox".parse::<BrowserKind>().unwrap(), BrowserKind::Firefox);
        assert!("lynx".parse::<BrowserKind>().is_err());
    }
}
