//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::controller::ControllerError;
use crate::core::report::{StepOutcome, TestReport};
use crate::core::worklist::WorklistError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Connection timeout
    pub const TIMEOUT: u8 = 4;

    /// Authentication failed
    pub const AUTH_FAILED: u8 = 5;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Protocol error
    pub const PROTOCOL_ERROR: u8 = 9;

    /// Controller rejected the operation
    pub const OPERATION_REJECTED: u8 = 10;

    /// Feature not offered by the controller
    pub const FEATURE_UNAVAILABLE: u8 = 11;

    /// Exit code for a failed step's error class
    pub fn for_kind(kind: &str) -> u8 {
        match kind {
            "invalid_params" => Self::INVALID_ARGS,
            "resolve" | "connection_failed" | "not_connected" => Self::CONNECTION_FAILED,
            "timeout" => Self::TIMEOUT,
            "auth_failed" => Self::AUTH_FAILED,
            "file_access" => Self::FILE_NOT_FOUND,
            "permission_denied" => Self::PERMISSION_DENIED,
            "protocol" => Self::PROTOCOL_ERROR,
            "rejected" => Self::OPERATION_REJECTED,
            "feature_unavailable" => Self::FEATURE_UNAVAILABLE,
            _ => Self::ERROR,
        }
    }
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),

    /// Failure whose details were already written as a report
    Reported(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Bad command-line input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Result of a connection test: the first failed step decides the code
    pub fn from_report(report: &TestReport) -> Self {
        match report.first_failure().map(|r| (&r.step, &r.outcome)) {
            Some((step, StepOutcome::Failed { kind, message })) => {
                Self::Error(ExitCodes::for_kind(kind), format!("{step}: {message}"))
            }
            _ if report.passed() => Self::success_with_message(format!(
                "{}/{} steps passed",
                report.passed_count(),
                report.steps.len()
            )),
            _ => Self::Error(ExitCodes::ERROR, "No steps were run".into()),
        }
    }

    /// Mark an error as already shown to the user
    #[must_use]
    pub fn reported(self) -> Self {
        match self {
            Self::Error(code, msg) => Self::Reported(code, msg),
            other => other,
        }
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) | Self::Reported(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) | Self::Reported(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Error that still has to be printed
    pub fn is_unreported_error(&self) -> bool {
        matches!(self, Self::Error(..))
    }

    /// Convert to ExitCode
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<std::io::Error> for CliResult {
    fn from(err: std::io::Error) -> Self {
        Self::Error(io_exit_code(&err), err.to_string())
    }
}

impl From<&ControllerError> for CliResult {
    fn from(err: &ControllerError) -> Self {
        // same mapping a report uses for a failed step
        Self::Error(ExitCodes::for_kind(err.kind_name()), err.to_string())
    }
}

impl From<&WorklistError> for CliResult {
    fn from(err: &WorklistError) -> Self {
        let code = match err {
            WorklistError::Io { source, .. } => io_exit_code(source),
            WorklistError::Parse { .. } => ExitCodes::INVALID_ARGS,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

fn io_exit_code(err: &std::io::Error) -> u8 {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => ExitCodes::FILE_NOT_FOUND,
        ErrorKind::PermissionDenied => ExitCodes::PERMISSION_DENIED,
        ErrorKind::ConnectionRefused => ExitCodes::CONNECTION_FAILED,
        ErrorKind::TimedOut => ExitCodes::TIMEOUT,
        _ => ExitCodes::ERROR,
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Timeout",
        5 => "Authentication failed",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        9 => "Protocol error",
        10 => "Operation rejected by controller",
        11 => "Feature unavailable on controller",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in 0..=11 {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::{ControllerKind, RejectionKind};
    use crate::core::report::{Step, StepResult};
    use std::time::Duration;

    #[test]
    fn test_cli_result() {
        let success = CliResult::success();
        assert!(success.is_success());
        assert_eq!(success.code(), 0);

        let error = CliResult::invalid_args("unknown flag");
        assert!(!error.is_success());
        assert!(error.is_unreported_error());
        assert_eq!(error.code(), ExitCodes::INVALID_ARGS);
        assert_eq!(error.message(), Some("unknown flag"));

        let reported = error.reported();
        assert!(!reported.is_success());
        assert!(!reported.is_unreported_error());
        assert_eq!(reported.code(), ExitCodes::INVALID_ARGS);
        assert!(!CliResult::success().reported().is_unreported_error());
    }

    #[test]
    fn test_from_io_error() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let result = CliResult::from(err);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
    }

    #[test]
    fn test_from_controller_error() {
        let cases = [
            (ControllerError::ConnectionFailed("refused".into()), ExitCodes::CONNECTION_FAILED),
            (ControllerError::Timeout(Duration::from_secs(10)), ExitCodes::TIMEOUT),
            (ControllerError::AuthFailed("bad password".into()), ExitCodes::AUTH_FAILED),
            (ControllerError::FeatureUnavailable("FluentControl".into()), ExitCodes::FEATURE_UNAVAILABLE),
            (
                ControllerError::Rejected {
                    kind: RejectionKind::DefinedExecution,
                    message: "NotEnoughLiquid".into(),
                },
                ExitCodes::OPERATION_REJECTED,
            ),
            (ControllerError::Protocol("bad frame".into()), ExitCodes::PROTOCOL_ERROR),
            (ControllerError::InvalidParams("port".into()), ExitCodes::INVALID_ARGS),
        ];
        for (err, code) in &cases {
            assert_eq!(CliResult::from(err).code(), *code, "{err}");
        }
    }

    #[test]
    fn test_file_access_uses_io_kind() {
        let err = ControllerError::FileAccess {
            path: "locked.gwl".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(CliResult::from(&err).code(), ExitCodes::PERMISSION_DENIED);
    }

    #[test]
    fn test_report_and_direct_codes_agree_for_denied_worklist() {
        let err = ControllerError::FileAccess {
            path: "locked.gwl".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let mut report = TestReport::new("localhost:50051", ControllerKind::Sila);
        report.push(StepResult::passed(Step::Connect, Duration::ZERO));
        report.push(StepResult::failed(Step::Worklist, &err, Duration::ZERO));

        let from_report = CliResult::from_report(&report);
        assert_eq!(from_report.code(), ExitCodes::PERMISSION_DENIED);
        assert_eq!(from_report.code(), CliResult::from(&err).code());
    }

    #[test]
    fn test_from_report() {
        let mut report = TestReport::new("localhost:50051", ControllerKind::Sila);
        report.push(StepResult::passed(Step::Connect, Duration::from_millis(3)));
        let result = CliResult::from_report(&report);
        assert!(result.is_success());
        assert_eq!(result.message(), Some("1/1 steps passed"));

        let err = ControllerError::FileAccess {
            path: "missing.gwl".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        report.push(StepResult::failed(Step::Worklist, &err, Duration::ZERO));
        let result = CliResult::from_report(&report);
        assert_eq!(result.code(), ExitCodes::FILE_NOT_FOUND);
        assert!(result.message().unwrap().starts_with("ExecuteWorklist:"));
    }

    #[test]
    fn test_empty_report_is_error() {
        let report = TestReport::new("localhost:50051", ControllerKind::Sila);
        assert_eq!(CliResult::from_report(&report).code(), ExitCodes::ERROR);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(exit_code_description(10), "Operation rejected by controller");
        assert_eq!(exit_code_description(200), "Unknown error");
    }
}
