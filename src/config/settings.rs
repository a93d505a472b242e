//! Application settings

use super::ConfigError;
use crate::core::controller::{ConnectionParams, ControllerKind, PipetteRequest, SimulatorConfig};
use crate::core::tester::TestPlan;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller endpoint and session options
    pub connection: ConnectionParams,
    /// Pipetting exercise
    pub pipette: PipetteRequest,
    /// Worklist step
    pub worklist: WorklistConfig,
    /// Run behaviour
    pub run: RunConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Simulator used with `--simulate`
    pub simulator: SimulatorConfig,
}

impl AppConfig {
    /// Load settings
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used when present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => match super::default_config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save settings, to the default location if no path is given
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => super::default_config_path().ok_or(ConfigError::NoConfigDir)?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        std::fs::write(&path, self.to_toml()?).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        self.pipette
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("pipette: {e}")))?;
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Controller the run should target
    pub fn controller_kind(&self) -> ControllerKind {
        if self.run.simulate {
            ControllerKind::Simulated
        } else {
            ControllerKind::Sila
        }
    }

    /// Full smoke-test plan: connect, pipette, worklist if configured
    pub fn test_plan(&self) -> TestPlan {
        let mut plan = TestPlan::connect_only()
            .with_pipette(self.pipette.clone())
            .fail_fast(self.run.fail_fast);
        if self.run.server_info {
            plan = plan.with_server_info();
        }
        if let Some(path) = &self.worklist.path {
            plan = plan.with_worklist(path.clone());
        }
        plan
    }
}

/// Worklist step settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorklistConfig {
    /// Worklist submitted by `check`
    pub path: Option<PathBuf>,
}

/// Run behaviour
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Skip remaining steps after the first failure
    pub fail_fast: bool,
    /// Read server identity as part of `check`
    pub server_info: bool,
    /// Run against the in-process simulator
    pub simulate: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines
    pub json: bool,
    /// Also write logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port, 50051);
        assert_eq!(config.pipette.channels, 4);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.controller_kind(), ControllerKind::Sila);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[connection]\nhost = \"fluent-01\"\n\n[worklist]\npath = \"simple.gwl\"\n\n[run]\nfail_fast = true"
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.connection.host, "fluent-01");
        assert_eq!(config.connection.port, 50051);
        assert!(config.connection.start_fluent);
        assert_eq!(config.worklist.path, Some(PathBuf::from("simple.gwl")));

        let plan = config.test_plan();
        assert!(plan.fail_fast);
        assert!(plan.pipette.is_some());
        assert_eq!(plan.worklist, Some(PathBuf::from("simple.gwl")));
    }

    #[test]
    fn test_demo_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/silaprobe.toml");
        let config = AppConfig::load(Some(&path)).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.connection.operation_timeout_secs, Some(300));
        assert!(config.run.server_info);
        assert_eq!(config.simulator.wells.get("Source_96:B1"), Some(&500.0));
        assert!(config.simulator.reachable);
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[connection\nport = ").unwrap();
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.connection.port = 50052;
        config.connection.password = Some("secret".into());
        config.run.simulate = true;
        config.simulator = SimulatorConfig::default().with_liquid("Source_96:A1", 500.0);

        let written = config.save(Some(&path)).unwrap();
        assert_eq!(written, path);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));

        let loaded = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.connection.port, 50052);
        assert_eq!(loaded.connection.password, None);
        assert_eq!(loaded.controller_kind(), ControllerKind::Simulated);
        assert_eq!(loaded.simulator.wells.get("Source_96:A1"), Some(&500.0));
    }

    #[test]
    fn test_validate_rejects_mismatched_volumes() {
        let mut config = AppConfig::default();
        config.pipette.channels = 2;
        config.pipette.volumes = vec![10.0, 20.0, 30.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_channel_count() {
        let mut config = AppConfig::default();
        config.pipette.channels = 4_000_000_000;
        match config.validate() {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("channels"), "{msg}"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut config = AppConfig::default();
        config.logging.level = "chatty".into();
        assert!(config.validate().is_err());

        config.logging.level = "debug".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config = AppConfig::default();
        config.connection.host = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
