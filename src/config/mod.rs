//! Configuration module
//!
//! Handles the TOML settings file. Values resolve as defaults, then the file,
//! then command-line flags and environment variables.

mod settings;

pub use settings::{AppConfig, LoggingConfig, RunConfig, WorklistConfig};

use directories::ProjectDirs;
use std::path::PathBuf;
use thiserror::Error;

/// Settings file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("Config file {}: {source}", path.display())]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for the settings schema
    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        /// Config file path
        path: PathBuf,
        /// TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Settings could not be rendered
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No home directory to derive the default path from
    #[error("Could not determine config directory")]
    NoConfigDir,

    /// Values parse but make no sense
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "silaprobe", "Silaprobe").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default settings file location
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}
