//! Suite runner: fixtures, retries, timeouts and results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ghsearch_api::{Annotation, ContractChecker, ContractReport, GithubClient};
use ghsearch_common::SuiteConfig;

use crate::cross_check::{verify_against_api, CrossCheckReport};
use crate::error::{E2eError, E2eResult};
use crate::fixture::{Artifact, Fixture, PageProvider};
use crate::flow::{FlowSettings, SearchOutcome};
use crate::page::Page;
use crate::pages::Pages;
use crate::reconciler::LocatorStrategy;
use crate::scenario::{Scenario, ScenarioKind};

/// What a passing scenario produced
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum ScenarioReport {
    Search(SearchOutcome),
    Contract(ContractReport),
    CrossCheck(CrossCheckReport),
}

impl ScenarioReport {
    pub fn annotations(&self) -> Vec<Annotation> {
        match self {
            ScenarioReport::Contract(report) => report.annotations.clone(),
            ScenarioReport::Search(outcome)
                if outcome.reconciliation.strategy == LocatorStrategy::VisibleText =>
            {
                vec![Annotation::new(
                    "text-fallback",
                    format!(
                        "'{}' was only found by visible text, not as a link",
                        outcome.reconciliation.login
                    ),
                )]
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    /// Passed after at least one failed attempt
    Flaky,
    Failed,
}

/// Result of a single attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptResult {
    /// 0-based attempt index
    pub attempt: u32,
    pub passed: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub artifacts: Vec<Artifact>,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub tags: Vec<String>,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
    pub annotations: Vec<Annotation>,
    pub report: Option<ScenarioReport>,
}

impl TestResult {
    pub fn passed(&self) -> bool {
        self.status != TestStatus::Failed
    }
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub flaky: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios one after another with a fresh context per attempt
pub struct SuiteRunner<Pr: PageProvider> {
    config: SuiteConfig,
    settings: FlowSettings,
    client: GithubClient,
    provider: Pr,
}

impl<Pr: PageProvider> SuiteRunner<Pr> {
    pub fn new(config: SuiteConfig, provider: Pr) -> E2eResult<Self> {
        let settings = FlowSettings::from_config(&config)?;
        let client = GithubClient::new(&config.api_base_url, config.response_timeout())?;
        Ok(Self {
            config,
            settings,
            client,
            provider,
        })
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    pub fn provider(&self) -> &Pr {
        &self.provider
    }

    /// Run all scenarios in the scenarios directory
    pub async fn run_all(&self) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        Ok(self.run_scenarios(&scenarios).await)
    }

    /// Run scenarios carrying `tag`
    pub async fn run_tagged(&self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        Ok(self.run_scenarios(&filtered).await)
    }

    /// Run a specific scenario by name
    pub async fn run_named(&self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = Scenario::load_all(&self.config.scenarios_dir)?;
        let scenario = scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::ScenarioParse(format!("Scenario not found: {}", name)))?;
        Ok(self.run_scenarios(std::slice::from_ref(&scenario)).await)
    }

    /// Run a list of scenarios
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> TestSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();

        info!("Running {} scenario(s)...", scenarios.len());

        for scenario in scenarios {
            let result = self.run_scenario(scenario).await;
            match result.status {
                TestStatus::Passed => info!("✓ {} ({} ms)", result.name, result.duration_ms),
                TestStatus::Flaky => warn!(
                    "~ {} passed on attempt {} ({} ms)",
                    result.name,
                    result.attempts.len(),
                    result.duration_ms
                ),
                TestStatus::Failed => error!(
                    "✗ {} - {}",
                    result.name,
                    result
                        .attempts
                        .last()
                        .and_then(|a| a.error.as_deref())
                        .unwrap_or("unknown error")
                ),
            }
            for annotation in &result.annotations {
                info!("  [{}] {}", annotation.kind, annotation.description);
            }
            results.push(result);
        }

        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        let passed = count(TestStatus::Passed);
        let failed = count(TestStatus::Failed);
        let flaky = count(TestStatus::Flaky);
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} flaky, {} failed ({} ms)",
            passed, flaky, failed, duration_ms
        );

        TestSuiteResult {
            run_id: Uuid::new_v4(),
            started_at,
            total: scenarios.len(),
            passed,
            failed,
            flaky,
            duration_ms,
            results,
        }
    }

    /// Run one scenario, retrying failed attempts up to the configured count
    pub async fn run_scenario(&self, scenario: &Scenario) -> TestResult {
        let start = Instant::now();
        let max_attempts = self.config.retries.saturating_add(1);
        let mut attempts = Vec::new();
        let mut report = None;

        for attempt in 0..max_attempts {
            debug!("Running '{}' attempt {}", scenario.name, attempt + 1);
            let (result, outcome) = self.run_attempt(scenario, attempt).await;
            attempts.push(result);

            match outcome {
                Ok(produced) => {
                    report = Some(produced);
                    break;
                }
                Err(e) if attempt + 1 < max_attempts => {
                    warn!("'{}' attempt {} failed, retrying: {}", scenario.name, attempt + 1, e);
                }
                Err(_) => {}
            }
        }

        let status = match (&report, attempts.len()) {
            (Some(_), 1) => TestStatus::Passed,
            (Some(_), _) => TestStatus::Flaky,
            (None, _) => TestStatus::Failed,
        };

        TestResult {
            name: scenario.name.clone(),
            tags: scenario.tags.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
            attempts,
            annotations: report.as_ref().map(ScenarioReport::annotations).unwrap_or_default(),
            report,
        }
    }

    async fn run_attempt(
        &self,
        scenario: &Scenario,
        attempt: u32,
    ) -> (AttemptResult, E2eResult<ScenarioReport>) {
        let start = Instant::now();
        let (outcome, artifacts) = if scenario.needs_browser() {
            self.run_in_browser(scenario, attempt).await
        } else {
            (self.bounded(scenario, self.execute_api(scenario)).await, Vec::new())
        };

        let result = AttemptResult {
            attempt,
            passed: outcome.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            error_kind: outcome.as_ref().err().map(|e| e.kind().to_string()),
            artifacts,
        };
        (result, outcome)
    }

    async fn run_in_browser(
        &self,
        scenario: &Scenario,
        attempt: u32,
    ) -> (E2eResult<ScenarioReport>, Vec<Artifact>) {
        let artifact_dir = self.artifact_dir(scenario, attempt);
        let fixture = match Fixture::acquire(
            &self.provider,
            self.settings.clone(),
            self.config.artifacts,
            artifact_dir,
            attempt,
        )
        .await
        {
            Ok(fixture) => fixture,
            Err(e) => return (Err(e), Vec::new()),
        };

        let outcome = {
            let pages = fixture.pages();
            self.bounded(scenario, self.execute_ui(&pages, scenario)).await
        };
        let artifacts = fixture.teardown(outcome.is_err()).await;
        (outcome, artifacts)
    }

    /// Apply the per-test timeout
    async fn bounded<F>(&self, scenario: &Scenario, work: F) -> E2eResult<ScenarioReport>
    where
        F: std::future::Future<Output = E2eResult<ScenarioReport>>,
    {
        match tokio::time::timeout(self.config.test_timeout(), work).await {
            Ok(outcome) => outcome,
            Err(_) => Err(E2eError::Timeout(format!(
                "scenario '{}' exceeded {} ms",
                scenario.name, self.config.test_timeout_ms
            ))),
        }
    }

    async fn execute_ui<P: Page>(
        &self,
        pages: &Pages<'_, P>,
        scenario: &Scenario,
    ) -> E2eResult<ScenarioReport> {
        match &scenario.kind {
            ScenarioKind::UiSearch { query } => {
                pages.user_search.goto().await?;
                let outcome = pages.user_search.search_user(query).await?;
                Ok(ScenarioReport::Search(outcome))
            }
            ScenarioKind::CrossCheck { query } => {
                pages.user_search.goto().await?;
                let checker = ContractChecker::new(&self.client);
                let report = verify_against_api(&pages.user_search, &checker, query).await?;
                Ok(ScenarioReport::CrossCheck(report))
            }
            ScenarioKind::ApiContract { .. } => self.execute_api(scenario).await,
        }
    }

    async fn execute_api(&self, scenario: &Scenario) -> E2eResult<ScenarioReport> {
        match &scenario.kind {
            ScenarioKind::ApiContract { username } => {
                let checker = ContractChecker::new(&self.client);
                Ok(ScenarioReport::Contract(checker.check_user(username).await?))
            }
            _ => Err(E2eError::ScenarioParse(format!(
                "scenario '{}' needs a browser",
                scenario.name
            ))),
        }
    }

    fn artifact_dir(&self, scenario: &Scenario, attempt: u32) -> PathBuf {
        let slug: String = scenario
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        self.config
            .artifacts_dir()
            .join(slug)
            .join(format!("attempt-{}", attempt + 1))
    }

    /// Write suite results to `test-results.json` in the output directory
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
