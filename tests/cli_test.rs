//! Runs the built binary and checks what lands on stdout

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn silaprobe(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_silaprobe"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("SILAPROBE_HOST")
        .env_remove("SILAPROBE_PORT")
        .output()
        .unwrap()
}

fn write_config(dir: &TempDir, reachable: bool) -> std::path::PathBuf {
    let path = dir.path().join("silaprobe.toml");
    let text = format!(
        "[run]\nsimulate = true\n\n[simulator]\nreachable = {reachable}\nstep_delay_ms = 0\n"
    );
    std::fs::write(&path, text).unwrap();
    path
}

#[test]
fn failed_json_check_prints_a_single_document() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, false);

    let output = silaprobe(&config, &["--format", "json", "check"]);
    assert_eq!(output.status.code(), Some(3));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not one JSON document ({e}):\n{stdout}"));
    assert_eq!(value["passed"], false);
    assert_eq!(value["exit_code"], 3);
    assert_eq!(value["steps"][0]["kind"], "connection_failed");
}

#[test]
fn passing_json_check_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, true);

    let output = silaprobe(&config, &["--format", "json", "check"]);
    assert_eq!(output.status.code(), Some(0));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["passed"], true);
    assert_eq!(value["exit_code"], 0);
}

#[test]
fn bad_arguments_print_one_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, true);

    let output = silaprobe(&config, &["--format", "json", "pipette", "--channels", "4000000000"]);
    assert_eq!(output.status.code(), Some(2));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["exit_code"], 2);
    assert!(value["error"].as_str().unwrap().contains("96"));
}
