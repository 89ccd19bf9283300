//! Main test runner that orchestrates the app server, the browser and the scenarios

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};

use crate::error::{E2eError, E2eResult, FailureKind};
use crate::fixture::Fixture;
use crate::intercept::{
    arm, ContractResponder, InterceptedRequest, RequestContract, RuleId, ScriptedResponder,
    SideChannel,
};
use crate::outcome::OutcomeAssertor;
use crate::playwright::{PlaywrightConfig, PlaywrightHandle};
use crate::scenario::{OutcomeKind, Scenario};
use crate::server::{ServerConfig, ServerHandle};
use crate::workflow::{WorkflowDriver, DEFAULT_LOCATOR_TIMEOUT};

/// Result of executing a single step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

/// Ordered record of the steps of one scenario
#[derive(Debug, Default)]
pub struct StepLog {
    steps: Vec<StepResult>,
}

impl StepLog {
    /// Await `step`, recording its name, duration and outcome.
    pub async fn run<T, F>(&mut self, name: &str, step: F) -> E2eResult<T>
    where
        F: Future<Output = E2eResult<T>>,
    {
        let start = Instant::now();
        debug!("Executing step: {}", name);

        let result = step.await;

        let (error, failure) = match &result {
            Ok(_) => (None, None),
            Err(e) => (Some(e.to_string()), Some(e.kind())),
        };
        self.steps.push(StepResult {
            step_name: name.to_string(),
            success: result.is_ok(),
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            failure,
        });

        result
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.success)
    }

    fn into_steps(self) -> Vec<StepResult> {
        self.steps
    }
}

/// Screenshot captured when a scenario failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCapture {
    pub path: String,
    pub sha256: String,
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    /// 1-based repetition index
    pub run: usize,
    pub success: bool,
    pub duration_ms: u64,
    pub expected: OutcomeKind,
    pub notification: Option<String>,
    pub request: Option<InterceptedRequest>,
    pub steps: Vec<StepResult>,
    pub failed_step: Option<String>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
    pub screenshot: Option<FailureCapture>,
}

/// Result of running all scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    /// Scenarios whose repeated runs did not agree on the outcome.
    pub fn inconsistent(&self) -> Vec<String> {
        let mut by_name: BTreeMap<&str, Vec<(bool, Option<FailureKind>)>> = BTreeMap::new();
        for result in &self.results {
            by_name
                .entry(result.name.as_str())
                .or_default()
                .push((result.success, result.failure));
        }

        by_name
            .into_iter()
            .filter(|(_, runs)| runs.windows(2).any(|w| w[0] != w[1]))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

struct ScenarioOutcome {
    notification: String,
    request: InterceptedRequest,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Running app server handle (if any)
    server: Option<ServerHandle>,

    /// Browser shared by all scenarios; each scenario gets its own context
    page: Option<PlaywrightHandle>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            server: None,
            page: None,
        }
    }

    /// Use an already launched browser
    pub fn with_browser(mut self, page: PlaywrightHandle) -> Self {
        self.page = Some(page);
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start (or probe) the application under test
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(()); // Already running
        }

        let server = ServerHandle::spawn(self.config.server.clone()).await?;

        // Update playwright config with actual server URL
        self.config.playwright.base_url = server.base_url().to_string();

        self.server = Some(server);
        Ok(())
    }

    /// Stop the server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    pub async fn start_browser(&mut self) -> E2eResult<()> {
        if self.page.is_none() {
            self.page = Some(PlaywrightHandle::launch(self.config.playwright.clone()).await?);
        }
        Ok(())
    }

    /// Close the browser and stop the server
    pub async fn shutdown(&mut self) -> E2eResult<()> {
        if let Some(page) = self.page.take() {
            page.shutdown().await?;
        }
        self.stop_server()
    }

    /// Scenarios from the configured directory, or the built-in set
    pub fn load_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        match &self.config.scenarios_dir {
            Some(dir) => Scenario::load_all(dir),
            None => Ok(Scenario::builtin()),
        }
    }

    /// Run every scenario
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let scenarios = self.load_scenarios()?;
        self.run_scenarios(&scenarios).await
    }

    /// Run scenarios matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let scenarios = self.load_scenarios()?;
        let filtered: Vec<Scenario> = Scenario::filter_by_tag(&scenarios, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_scenarios(&filtered).await
    }

    /// Run a specific scenario by name
    pub async fn run_named(&mut self, name: &str) -> E2eResult<TestSuiteResult> {
        let scenario = self
            .load_scenarios()?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::InvalidScenario(format!("Scenario not found: {}", name)))?;
        self.run_scenarios(std::slice::from_ref(&scenario)).await
    }

    /// Run a list of scenarios, `repeat` times each
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let started_at = chrono::Utc::now().to_rfc3339();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let skipped = 0;

        self.start_browser().await?;

        let repeat = self.config.repeat.max(1);
        info!("Running {} scenario(s) x{}...", scenarios.len(), repeat);

        for run in 1..=repeat {
            for scenario in scenarios {
                let result = self.run_scenario(scenario, run).await?;
                if result.success {
                    passed += 1;
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                } else {
                    failed += 1;
                    error!(
                        "✗ {} [{}] at {} - {}",
                        result.name,
                        result.failure.map(|k| k.to_string()).unwrap_or_default(),
                        result.failed_step.as_deref().unwrap_or("?"),
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                results.push(result);
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        let suite = TestSuiteResult {
            started_at,
            total: results.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            results,
        };

        for name in suite.inconsistent() {
            warn!("Scenario '{}' produced different outcomes across runs", name);
        }

        Ok(suite)
    }

    /// Run one scenario in a fresh browser context
    ///
    /// Scenario failures are reported in the returned result; an `Err` means
    /// the browser itself is unusable.
    pub async fn run_scenario(&mut self, scenario: &Scenario, run: usize) -> E2eResult<TestResult> {
        let Self { config, page, .. } = self;
        let page = page
            .as_mut()
            .ok_or_else(|| E2eError::Playwright("browser not started".into()))?;

        let start = Instant::now();
        debug!("Running scenario: {} (run {})", scenario.name, run);

        let mut steps = StepLog::default();
        let outcome = execute(page, config, scenario, &mut steps).await;

        let screenshot = match &outcome {
            Err(_) if config.capture_failures => {
                capture_failure(page, &format!("{}-run{}", scenario.name, run)).await
            }
            _ => None,
        };

        if let Err(e) = page.close_context().await {
            warn!("Failed to close context for '{}': {}", scenario.name, e);
            if matches!(e, E2eError::DriverUnresponsive { .. }) {
                return Err(e);
            }
        }

        let failed_step = steps.failed_step().map(|s| s.step_name.clone());
        let duration_ms = start.elapsed().as_millis() as u64;

        let (notification, request, failure, error) = match outcome {
            Ok(o) => (Some(o.notification), Some(o.request), None, None),
            Err(e) => (None, None, Some(e.kind()), Some(e.to_string())),
        };

        Ok(TestResult {
            name: scenario.name.clone(),
            run,
            success: error.is_none(),
            duration_ms,
            expected: scenario.expected_outcome(),
            notification,
            request,
            steps: steps.into_steps(),
            failed_step,
            failure,
            error,
            screenshot,
        })
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

/// Bootstrap → arm → navigate → trigger → assert, fail-fast.
async fn execute(
    page: &mut PlaywrightHandle,
    config: &RunnerConfig,
    scenario: &Scenario,
    steps: &mut StepLog,
) -> E2eResult<ScenarioOutcome> {
    scenario.validate()?;
    let driver = WorkflowDriver::new(config.locator_timeout)?;
    let assertor = OutcomeAssertor::new(Duration::from_millis(scenario.timeout_ms))
        .strict_exclusivity(config.strict_exclusivity);

    steps
        .run("bootstrap-context", page.open_context(&config.fixture))
        .await?;

    let flag = SideChannel::default();
    let scripted = ScriptedResponder::new(scenario.response.reply()?);
    let rule: RuleId = steps
        .run("arm-interceptor", async {
            if scenario.verify_request {
                let responder =
                    ContractResponder::new(RequestContract::extract_style(), flag.clone(), scripted);
                arm(page, &config.endpoint, responder).await
            } else {
                arm(page, &config.endpoint, scripted).await
            }
        })
        .await?;

    steps
        .run("navigate", page.goto(&config.playwright.base_url))
        .await?;

    driver.trigger(page, steps).await?;

    let notification = steps
        .run(
            "await-outcome",
            assertor.expect_outcome(page, scenario.expected_outcome(), rule),
        )
        .await?;

    if scenario.verify_request {
        steps
            .run("verify-request-flag", async { assertor.expect_flag(&flag) })
            .await?;
    }

    let request = steps
        .run("verify-single-call", assertor.expect_single_call(page, rule))
        .await?;

    Ok(ScenarioOutcome {
        notification,
        request,
    })
}

/// Best-effort screenshot of the failed state, fingerprinted for the report
async fn capture_failure(page: &mut PlaywrightHandle, name: &str) -> Option<FailureCapture> {
    let path = match page.screenshot(name, true).await {
        Ok(path) => path,
        Err(e) => {
            warn!("Failure screenshot '{}' not taken: {}", name, e);
            return None;
        }
    };

    match std::fs::read(&path) {
        Ok(data) => {
            let mut hasher = Sha256::new();
            hasher.update(&data);
            Some(FailureCapture {
                path: path.to_string_lossy().to_string(),
                sha256: hex::encode(hasher.finalize()),
            })
        }
        Err(e) => {
            warn!("Failure screenshot '{}' unreadable: {}", path.display(), e);
            None
        }
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub server: ServerConfig,
    pub playwright: PlaywrightConfig,

    /// YAML scenarios; the built-in set when absent
    pub scenarios_dir: Option<PathBuf>,
    pub output_dir: PathBuf,

    /// Glob of the intercepted backend endpoint
    pub endpoint: String,

    pub fixture: Fixture,
    pub locator_timeout: Duration,
    pub strict_exclusivity: bool,
    pub repeat: usize,
    pub capture_failures: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            playwright: PlaywrightConfig::default(),
            scenarios_dir: None,
            output_dir: PathBuf::from("test-results"),
            endpoint: "**/api/extract-style".to_string(),
            fixture: Fixture::onboarding_dismissed(),
            locator_timeout: DEFAULT_LOCATOR_TIMEOUT,
            strict_exclusivity: false,
            repeat: 1,
            capture_failures: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, success: bool, failure: Option<FailureKind>) -> TestResult {
        TestResult {
            name: name.to_string(),
            run: 1,
            success,
            duration_ms: 0,
            expected: OutcomeKind::Success,
            notification: None,
            request: None,
            steps: vec![],
            failed_step: None,
            failure,
            error: None,
            screenshot: None,
        }
    }

    fn suite(results: Vec<TestResult>) -> TestSuiteResult {
        TestSuiteResult {
            started_at: String::new(),
            total: results.len(),
            passed: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
            results,
        }
    }

    #[test]
    fn test_inconsistent_runs_detected() {
        let suite = suite(vec![
            result("a", true, None),
            result("b", false, Some(FailureKind::LocatorTimeout)),
            result("a", true, None),
            result("b", false, Some(FailureKind::InterceptionMiss)),
        ]);
        assert_eq!(suite.inconsistent(), vec!["b".to_string()]);
    }

    #[test]
    fn test_consistent_runs() {
        let suite = suite(vec![result("a", true, None), result("a", true, None)]);
        assert!(suite.inconsistent().is_empty());
    }

    #[tokio::test]
    async fn test_step_log_records_failure_kind() {
        let mut steps = StepLog::default();
        steps.run("ok", async { Ok::<_, E2eError>(()) }).await.unwrap();
        let err = steps
            .run("locate", async {
                Err::<(), _>(E2eError::LocatorTimeout {
                    locator: "css(input)".into(),
                    timeout_ms: 5000,
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::LocatorTimeout);
        assert_eq!(steps.steps().len(), 2);
        let failed = steps.failed_step().unwrap();
        assert_eq!(failed.step_name, "locate");
        assert_eq!(failed.failure, Some(FailureKind::LocatorTimeout));
    }

    #[test]
    fn test_runner_config_default() {
        let config = RunnerConfig::default();
        assert_eq!(config.endpoint, "**/api/extract-style");
        assert_eq!(config.locator_timeout, Duration::from_millis(5000));
        assert_eq!(config.repeat, 1);
        assert!(!config.strict_exclusivity);
    }
}
