//! Test report
//!
//! Outcome of each step in a connection test, plus rendering for the CLI.

use super::controller::{ControllerError, ControllerKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Steps a connection test can exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Open the session
    Connect,
    /// Read server identity
    ServerInfo,
    /// Multi-channel pipetting exercise
    Pipette,
    /// Worklist execution
    Worklist,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "Connect"),
            Self::ServerInfo => write!(f, "ServerInfo"),
            Self::Pipette => write!(f, "RunMultiChannelPipette"),
            Self::Worklist => write!(f, "ExecuteWorklist"),
        }
    }
}

/// Step outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Controller accepted the step
    Passed,
    /// Step failed
    Failed {
        /// Error class (see [`ControllerError::kind_name`])
        kind: String,
        /// Error message
        message: String,
    },
    /// Step was not attempted
    Skipped,
}

impl StepOutcome {
    /// Build a failure from a controller error
    pub fn failed(err: &ControllerError) -> Self {
        Self::Failed {
            kind: err.kind_name().to_string(),
            message: err.to_string(),
        }
    }

    /// Passed?
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    /// Failed?
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Which step
    pub step: Step,
    /// What happened
    #[serde(flatten)]
    pub outcome: StepOutcome,
    /// Time spent on the step
    #[serde(with = "duration_ms", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Optional detail (server name, worklist path, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StepResult {
    /// Passed step
    pub fn passed(step: Step, elapsed: Duration) -> Self {
        Self {
            step,
            outcome: StepOutcome::Passed,
            elapsed,
            detail: None,
        }
    }

    /// Failed step
    pub fn failed(step: Step, err: &ControllerError, elapsed: Duration) -> Self {
        Self {
            step,
            outcome: StepOutcome::failed(err),
            elapsed,
            detail: None,
        }
    }

    /// Step that was never attempted
    pub fn skipped(step: Step) -> Self {
        Self {
            step,
            outcome: StepOutcome::Skipped,
            elapsed: Duration::ZERO,
            detail: None,
        }
    }

    /// Attach detail text
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Report for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// `host:port` tested
    pub endpoint: String,
    /// Controller implementation
    pub controller: ControllerKind,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Steps in execution order
    pub steps: Vec<StepResult>,
}

impl TestReport {
    /// Start an empty report
    pub fn new(endpoint: impl Into<String>, controller: ControllerKind) -> Self {
        Self {
            endpoint: endpoint.into(),
            controller,
            started_at: Utc::now(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn push(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Result for a given step
    pub fn step(&self, step: Step) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// True when at least one step ran and none failed or was skipped
    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|r| r.outcome.is_passed())
    }

    /// First failed step
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|r| r.outcome.is_failed())
    }

    /// Count of passed steps
    pub fn passed_count(&self) -> usize {
        self.steps.iter().filter(|r| r.outcome.is_passed()).count()
    }

    /// Total time across steps
    pub fn total_elapsed(&self) -> Duration {
        self.steps.iter().map(|r| r.elapsed).sum()
    }

    /// JSON value with the overall verdict added
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("passed".into(), serde_json::Value::Bool(self.passed()));
        }
        Ok(value)
    }

    /// JSON rendering
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_value()?)
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Connection test against {} ({}) at {}",
            self.endpoint,
            self.controller,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f, "{:-<72}", "")?;
        for result in &self.steps {
            let status = match &result.outcome {
                StepOutcome::Passed => "PASS",
                StepOutcome::Failed { .. } => "FAIL",
                StepOutcome::Skipped => "SKIP",
            };
            write!(
                f,
                "{:<24} {:<5} {:>9.1} ms",
                result.step.to_string(),
                status,
                result.elapsed.as_secs_f64() * 1000.0
            )?;
            if let Some(detail) = &result.detail {
                write!(f, "  {detail}")?;
            }
            writeln!(f)?;
            if let StepOutcome::Failed { message, .. } = &result.outcome {
                writeln!(f, "    {message}")?;
            }
        }
        writeln!(f, "{:-<72}", "")?;
        write!(
            f,
            "{}: {}/{} steps passed",
            if self.passed() { "PASSED" } else { "FAILED" },
            self.passed_count(),
            self.steps.len()
        )
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestReport {
        let mut report = TestReport::new("localhost:50051", ControllerKind::Sila);
        report.push(StepResult::passed(Step::Connect, Duration::from_millis(12)));
        report.push(StepResult::failed(
            Step::Pipette,
            &ControllerError::ConnectionFailed("reset".into()),
            Duration::from_millis(3),
        ));
        report.push(StepResult::skipped(Step::Worklist));
        report
    }

    #[test]
    fn test_report_verdict() {
        let report = sample();
        assert!(!report.passed());
        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.first_failure().unwrap().step, Step::Pipette);
        assert_eq!(report.total_elapsed(), Duration::from_millis(15));

        let mut ok = TestReport::new("localhost:50051", ControllerKind::Simulated);
        assert!(!ok.passed());
        ok.push(StepResult::passed(Step::Connect, Duration::ZERO));
        assert!(ok.passed());
    }

    #[test]
    fn test_report_json() {
        let json = sample().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["passed"], false);
        assert_eq!(value["controller"], "sila");
        assert_eq!(value["steps"][0]["step"], "connect");
        assert_eq!(value["steps"][0]["status"], "passed");
        assert_eq!(value["steps"][1]["kind"], "connection_failed");
        assert_eq!(value["steps"][2]["status"], "skipped");
    }

    #[test]
    fn test_report_text() {
        let text = sample().to_string();
        assert!(text.contains("Connect"));
        assert!(text.contains("FAIL"));
        assert!(text.contains("SKIP"));
        assert!(text.ends_with("FAILED: 1/3 steps passed"));
    }
}
