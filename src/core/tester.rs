//! Connection tester
//!
//! Drives a controller through the fixed smoke-test sequence: connect,
//! multi-channel pipetting, worklist execution. Steps run one after another
//! on a single session. A failed connect skips everything after it.

use super::controller::{ControllerClient, PipetteRequest, ServerInfo};
use super::report::{Step, StepResult, TestReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// What a run should exercise
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestPlan {
    /// Read server identity after connecting
    pub server_info: bool,
    /// Pipetting exercise, if any
    pub pipette: Option<PipetteRequest>,
    /// Worklist to execute, if any
    pub worklist: Option<PathBuf>,
    /// Skip remaining steps after the first failure
    pub fail_fast: bool,
}

impl TestPlan {
    /// Connect only
    pub fn connect_only() -> Self {
        Self::default()
    }

    /// Add a pipetting step
    #[must_use]
    pub fn with_pipette(mut self, request: PipetteRequest) -> Self {
        self.pipette = Some(request);
        self
    }

    /// Add a worklist step
    #[must_use]
    pub fn with_worklist(mut self, path: impl Into<PathBuf>) -> Self {
        self.worklist = Some(path.into());
        self
    }

    /// Add a server info step
    #[must_use]
    pub fn with_server_info(mut self) -> Self {
        self.server_info = true;
        self
    }

    /// Stop at the first failure
    #[must_use]
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

/// Runs connection tests against one controller
pub struct ConnectionTester {
    controller: Box<dyn ControllerClient>,
    server: Option<ServerInfo>,
}

impl ConnectionTester {
    /// Create a tester for the given controller
    pub fn new(controller: Box<dyn ControllerClient>) -> Self {
        Self {
            controller,
            server: None,
        }
    }

    /// Endpoint under test
    pub fn endpoint(&self) -> String {
        self.controller.endpoint()
    }

    /// Server identity, once read
    pub fn server(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Open the session
    pub async fn connect(&mut self) -> StepResult {
        let endpoint = self.controller.endpoint();
        tracing::info!("Attempting to connect to {} controller at {}", self.controller.kind(), endpoint);

        let started = Instant::now();
        match self.controller.connect().await {
            Ok(()) => {
                tracing::info!("Connection successful");
                StepResult::passed(Step::Connect, started.elapsed()).with_detail(endpoint)
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", endpoint, e);
                StepResult::failed(Step::Connect, &e, started.elapsed())
            }
        }
    }

    /// Read server identity
    pub async fn server_info(&mut self) -> StepResult {
        let started = Instant::now();
        match self.controller.server_info().await {
            Ok(info) => {
                tracing::info!("Server '{}' ({} {})", info.name, info.server_type, info.version);
                tracing::info!("Current FluentControl state: {}", info.state);
                let detail = format!(
                    "{} {}, {}, {} runnable methods",
                    info.name,
                    info.version,
                    info.state,
                    info.runnable_methods.len()
                );
                self.server = Some(info);
                StepResult::passed(Step::ServerInfo, started.elapsed()).with_detail(detail)
            }
            Err(e) => {
                tracing::error!("Failed to read server info: {}", e);
                StepResult::failed(Step::ServerInfo, &e, started.elapsed())
            }
        }
    }

    /// Run the multi-channel pipetting exercise
    pub async fn run_multichannel_pipette(&mut self, request: &PipetteRequest) -> StepResult {
        let started = Instant::now();
        match self.controller.run_multichannel_pipette(request).await {
            Ok(()) => {
                tracing::info!("Pipetted on {} channels", request.channels);
                StepResult::passed(Step::Pipette, started.elapsed())
                    .with_detail(format!("{} channels, {} µL", request.channels, request.total_volume()))
            }
            Err(e) => {
                tracing::error!("Failed to pipette: {}", e);
                StepResult::failed(Step::Pipette, &e, started.elapsed())
            }
        }
    }

    /// Execute a worklist file
    pub async fn execute_worklist(&mut self, path: &std::path::Path) -> StepResult {
        let started = Instant::now();
        match self.controller.execute_worklist(path).await {
            Ok(()) => {
                tracing::info!("Executed worklist: {}", path.display());
                StepResult::passed(Step::Worklist, started.elapsed())
                    .with_detail(path.display().to_string())
            }
            Err(e) => {
                tracing::error!("Failed to execute worklist: {}", e);
                StepResult::failed(Step::Worklist, &e, started.elapsed())
                    .with_detail(path.display().to_string())
            }
        }
    }

    /// Release the session; errors are logged only
    pub async fn disconnect(&mut self) {
        if !self.controller.is_connected() {
            return;
        }
        if let Err(e) = self.controller.disconnect().await {
            tracing::warn!("Error disconnecting from {}: {}", self.controller.endpoint(), e);
        }
    }

    /// Run the plan end to end and disconnect
    pub async fn run(&mut self, plan: &TestPlan) -> TestReport {
        let mut report = TestReport::new(self.controller.endpoint(), self.controller.kind());

        let mut pending = Vec::new();
        if plan.server_info {
            pending.push(Step::ServerInfo);
        }
        if plan.pipette.is_some() {
            pending.push(Step::Pipette);
        }
        if plan.worklist.is_some() {
            pending.push(Step::Worklist);
        }

        let connect = self.connect().await;
        let mut halted = !connect.outcome.is_passed();
        report.push(connect);

        for step in pending {
            if halted {
                report.push(StepResult::skipped(step));
                continue;
            }

            let result = match (step, &plan.pipette, &plan.worklist) {
                (Step::ServerInfo, _, _) => self.server_info().await,
                (Step::Pipette, Some(request), _) => self.run_multichannel_pipette(request).await,
                (Step::Worklist, _, Some(path)) => self.execute_worklist(path).await,
                _ => StepResult::skipped(step),
            };

            if plan.fail_fast && result.outcome.is_failed() {
                halted = true;
            }
            report.push(result);
        }

        self.disconnect().await;

        if report.passed() {
            tracing::info!("Test complete: all {} steps passed", report.steps.len());
        } else {
            tracing::warn!(
                "Test complete: {}/{} steps passed",
                report.passed_count(),
                report.steps.len()
            );
        }
        report
    }
}
