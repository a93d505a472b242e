//! Logging setup
//!
//! Logs go to stderr so stdout stays clean for reports. `RUST_LOG` wins over
//! the configured level and the `-v`/`-q` flags.

use crate::config::LoggingConfig;
use anyhow::Context;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Level after applying `-v`/`-q` to the configured one
pub fn effective_level(config: &LoggingConfig, verbose: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbose {
        0 => config.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive until exit or buffered file output is lost.
pub fn init_logging(config: &LoggingConfig, level: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![if config.json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    }];

    let mut guard = None;
    if let Some(path) = &config.file {
        let (writer, file_guard) = file_writer(path)?;
        guard = Some(file_guard);
        layers.push(if config.json {
            fmt::layer().json().with_writer(writer).boxed()
        } else {
            fmt::layer().with_ansi(false).with_writer(writer).boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(guard)
}

fn file_writer(
    path: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, name);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_level() {
        let config = LoggingConfig::default();
        assert_eq!(effective_level(&config, 0, false), "info");
        assert_eq!(effective_level(&config, 1, false), "debug");
        assert_eq!(effective_level(&config, 3, false), "trace");
        assert_eq!(effective_level(&config, 2, true), "error");

        let config = LoggingConfig {
            level: "warn".into(),
            ..LoggingConfig::default()
        };
        assert_eq!(effective_level(&config, 0, false), "warn");
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("silaprobe.log");
        let (_writer, _guard) = file_writer(&path).unwrap();
        assert!(dir.path().join("logs").is_dir());
    }
}
