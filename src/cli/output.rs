//! CLI output rendering
//!
//! Text for humans, JSON for automation.

use super::CliResult;
use crate::core::controller::ServerInfo;
use crate::core::report::TestReport;
use crate::core::worklist::Worklist;
use clap::ValueEnum;
use std::fmt::Write as _;
use std::path::Path;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Render a test report
///
/// The JSON form is the only document a run writes to stdout, so it carries
/// the exit code as well.
pub fn format_report(report: &TestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => report.to_string(),
        OutputFormat::Json => {
            let exit_code = CliResult::from_report(report).code();
            report
                .to_value()
                .and_then(|mut value| {
                    if let Some(map) = value.as_object_mut() {
                        map.insert("exit_code".into(), exit_code.into());
                    }
                    serde_json::to_string_pretty(&value)
                })
                .unwrap_or_else(|e| {
                    serde_json::json!({ "error": e.to_string(), "exit_code": exit_code })
                        .to_string()
                })
        }
    }
}

/// Render server identity
pub fn format_server_info(endpoint: &str, info: &ServerInfo, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Server at {endpoint}\n  Name:    {}\n  Type:    {}\n  Version: {}\n  UUID:    {}\n  State:   {}",
                info.name, info.server_type, info.version, info.uuid, info.state
            );
            if info.runnable_methods.is_empty() {
                out.push_str("\n  Methods: none (load a method in FluentControl)");
            } else {
                let _ = write!(out, "\n  Methods: {}", info.runnable_methods.join(", "));
            }
            out
        }
        OutputFormat::Json => serde_json::json!({
            "endpoint": endpoint,
            "name": info.name,
            "server_type": info.server_type,
            "version": info.version,
            "uuid": info.uuid,
            "state": info.state,
            "runnable_methods": info.runnable_methods,
            "exit_code": 0,
        })
        .to_string(),
    }
}

/// Render a parsed worklist
pub fn format_worklist(path: &Path, worklist: &Worklist, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = format!("{}: {} commands", path.display(), worklist.len());
            if worklist.skipped > 0 {
                let _ = write!(out, " ({} records skipped)", worklist.skipped);
            }
            for (index, command) in worklist.commands.iter().enumerate() {
                let _ = write!(out, "\n  {:>4}  {}  {}", index + 1, command.code(), command);
            }
            let _ = write!(out, "\nTotal aspirated: {} µL", worklist.aspirated_volume());
            out
        }
        OutputFormat::Json => serde_json::json!({
            "path": path.display().to_string(),
            "commands": worklist.commands,
            "skipped": worklist.skipped,
            "aspirated_volume": worklist.aspirated_volume(),
        })
        .to_string(),
    }
}

/// Render a failure that ended the command before a report existed
pub fn format_error(result: &CliResult, format: OutputFormat) -> String {
    let message = result.message().unwrap_or("Unknown error");
    match format {
        OutputFormat::Text => format!("Error: {message}"),
        OutputFormat::Json => serde_json::json!({
            "error": message,
            "exit_code": result.code(),
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::controller::ControllerKind;
    use crate::core::report::{Step, StepResult};
    use std::time::Duration;

    #[test]
    fn test_report_json() {
        let mut report = TestReport::new("localhost:50051", ControllerKind::Simulated);
        report.push(StepResult::passed(Step::Connect, Duration::from_millis(2)));

        let value: serde_json::Value =
            serde_json::from_str(&format_report(&report, OutputFormat::Json)).unwrap();
        assert_eq!(value["passed"], true);
        assert_eq!(value["endpoint"], "localhost:50051");
        assert_eq!(value["exit_code"], 0);
    }

    #[test]
    fn test_failed_report_json_carries_exit_code() {
        let mut report = TestReport::new("localhost:50051", ControllerKind::Sila);
        let err = crate::core::controller::ControllerError::ConnectionFailed("refused".into());
        report.push(StepResult::failed(Step::Connect, &err, Duration::ZERO));

        let value: serde_json::Value =
            serde_json::from_str(&format_report(&report, OutputFormat::Json)).unwrap();
        assert_eq!(value["passed"], false);
        assert_eq!(value["exit_code"], 3);
    }

    #[test]
    fn test_server_info_text() {
        let info = ServerInfo {
            name: "FluentControl".into(),
            server_type: "TecanFluent".into(),
            version: "3.4".into(),
            uuid: "b7a4".into(),
            state: "Ready".into(),
            runnable_methods: vec!["Prime".into(), "DailyCheck".into()],
        };
        let text = format_server_info("fluent:50051", &info, OutputFormat::Text);
        assert!(text.contains("Version: 3.4"));
        assert!(text.contains("State:   Ready"));
        assert!(text.contains("Methods: Prime, DailyCheck"));

        let json = format_server_info("fluent:50051", &info, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["name"], "FluentControl");
        assert_eq!(value["runnable_methods"][1], "DailyCheck");

        let idle = ServerInfo {
            runnable_methods: Vec::new(),
            ..info
        };
        let text = format_server_info("fluent:50051", &idle, OutputFormat::Text);
        assert!(text.contains("Methods: none"));
    }

    #[test]
    fn test_worklist_output() {
        let worklist = Worklist::parse("A;Src;A1;;50\nD;Dst;B1;;50\nX;unknown\n").unwrap();
        let text = format_worklist(Path::new("simple.gwl"), &worklist, OutputFormat::Text);
        assert!(text.starts_with("simple.gwl: 2 commands (1 records skipped)"));
        assert!(text.contains("aspirate 50 µL from Src A1"));

        let json = format_worklist(Path::new("simple.gwl"), &worklist, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["commands"][1]["type"], "dispense");
        assert_eq!(value["skipped"], 1);
    }

    #[test]
    fn test_error_json() {
        let result = CliResult::invalid_args("unknown flag");
        let value: serde_json::Value =
            serde_json::from_str(&format_error(&result, OutputFormat::Json)).unwrap();
        assert_eq!(value["exit_code"], 2);
        assert_eq!(value["error"], "unknown flag");
    }
}
