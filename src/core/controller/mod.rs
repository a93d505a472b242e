//! Controller clients
//!
//! A controller is the vendor process that accepts remote commands for the
//! robot. Supports:
//! - SiLA2 over gRPC (Tecan FluentControl connector)
//! - In-process simulation for dry runs

pub mod proto;
mod sila;
mod simulated;

pub use sila::SilaController;
pub use simulated::{
    SimulatedCommand, SimulatedController, SimulatorConfig, SimulatorStatus,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default controller host
pub const DEFAULT_HOST: &str = "localhost";

/// Default SiLA2 server port
pub const DEFAULT_PORT: u16 = 50051;

/// Most channels a Fluent arm carries (MCA 96 head)
pub const MAX_CHANNELS: u32 = 96;

/// Controller type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// SiLA2 server
    Sila,
    /// In-process simulation
    Simulated,
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sila => write!(f, "SiLA2"),
            Self::Simulated => write!(f, "Simulated"),
        }
    }
}

/// How the controller rejected a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// A parameter failed validation
    Validation,
    /// A feature-defined execution error
    DefinedExecution,
    /// Any other execution error
    UndefinedExecution,
    /// SiLA framework error (bad UUID, not accepted, ...)
    Framework,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation error"),
            Self::DefinedExecution => write!(f, "execution error"),
            Self::UndefinedExecution => write!(f, "undefined execution error"),
            Self::Framework => write!(f, "framework error"),
        }
    }
}

/// Controller error types
#[derive(Error, Debug)]
pub enum ControllerError {
    /// Connection parameters are unusable
    #[error("Invalid connection parameters: {0}")]
    InvalidParams(String),

    /// Host name did not resolve
    #[error("Could not resolve {host}: {reason}")]
    Resolve {
        /// Host that failed to resolve
        host: String,
        /// Resolver message
        reason: String,
    },

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection or operation timeout
    #[error("Timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    /// No open session
    #[error("Not connected")]
    NotConnected,

    /// Credentials were refused
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Server does not offer the feature (missing connector or license)
    #[error("Feature unavailable on controller: {0}")]
    FeatureUnavailable(String),

    /// Controller refused or failed the command
    #[error("Controller rejected command ({kind}): {message}")]
    Rejected {
        /// Rejection class
        kind: RejectionKind,
        /// Controller message
        message: String,
    },

    /// Local file could not be read
    #[error("Cannot read {}: {source}", path.display())]
    FileAccess {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Unexpected protocol behaviour
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ControllerError {
    /// Short machine-readable name for reports
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "invalid_params",
            Self::Resolve { .. } => "resolve",
            Self::ConnectionFailed(_) => "connection_failed",
            Self::Timeout(_) => "timeout",
            Self::NotConnected => "not_connected",
            Self::AuthFailed(_) => "auth_failed",
            Self::FeatureUnavailable(_) => "feature_unavailable",
            Self::Rejected { .. } => "rejected",
            Self::FileAccess { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                "permission_denied"
            }
            Self::FileAccess { .. } => "file_access",
            Self::Protocol(_) => "protocol",
        }
    }
}

/// Connection parameters, fixed for the lifetime of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Plain HTTP/2 without TLS
    pub insecure: bool,
    /// CA certificate (PEM) for TLS connections
    pub ca_cert: Option<PathBuf>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Upper bound for a single command, in seconds
    pub operation_timeout_secs: Option<u64>,
    /// UMS user name
    pub username: Option<String>,
    /// UMS password
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Send StartFluentControl after connecting
    pub start_fluent: bool,
}

impl ConnectionParams {
    /// Create parameters for the given endpoint
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            insecure: true,
            ca_cert: None,
            connect_timeout_secs: 10,
            operation_timeout_secs: None,
            username: None,
            password: None,
            start_fluent: true,
        }
    }

    /// Set connection timeout
    #[must_use]
    pub fn connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set operation timeout
    #[must_use]
    pub fn operation_timeout(mut self, secs: Option<u64>) -> Self {
        self.operation_timeout_secs = secs;
        self
    }

    /// Set UMS credentials
    #[must_use]
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Use TLS, optionally trusting a specific CA
    #[must_use]
    pub fn tls(mut self, ca_cert: Option<PathBuf>) -> Self {
        self.insecure = false;
        self.ca_cert = ca_cert;
        self
    }

    /// Check the parameters before any connection attempt
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.host.trim().is_empty() {
            return Err(ControllerError::InvalidParams("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ControllerError::InvalidParams(
                "port must be a valid port number (1-65535)".into(),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ControllerError::InvalidParams(
                "connect timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }

    /// Host without the brackets of an IPv6 literal, for resolving and TLS
    pub fn bare_host(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }

    /// `host:port` string
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Gateway URI for the gRPC channel
    pub fn uri(&self) -> String {
        let scheme = if self.insecure { "http" } else { "https" };
        if self.host.contains(':') && !self.host.starts_with('[') {
            // bare IPv6 literal
            format!("{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            format!("{}://{}:{}", scheme, self.host, self.port)
        }
    }

    /// Connection timeout as a duration
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Operation timeout as a duration
    pub fn operation_timeout_duration(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

/// Multi-channel pipetting command, passed through to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipetteRequest {
    /// Number of channels to use
    pub channels: u32,
    /// Volume per channel in µL
    pub volumes: Vec<f64>,
    /// Source labware/well identifier
    pub source: String,
    /// Destination labware/well identifier
    pub destination: String,
    /// Liquid class name
    pub liquid_class: String,
    /// Flow rate in µL/s
    pub flow_rate: f64,
}

impl PipetteRequest {
    /// Same volume on every channel
    pub fn uniform(channels: u32, volume: f64, source: &str, destination: &str) -> Self {
        Self {
            channels,
            volumes: vec![volume; channels as usize],
            source: source.to_string(),
            destination: destination.to_string(),
            liquid_class: "Water".to_string(),
            flow_rate: 100.0,
        }
    }

    /// Set liquid class
    #[must_use]
    pub fn liquid_class(mut self, liquid_class: &str) -> Self {
        self.liquid_class = liquid_class.to_string();
        self
    }

    /// Set flow rate
    #[must_use]
    pub fn flow_rate(mut self, flow_rate: f64) -> Self {
        self.flow_rate = flow_rate;
        self
    }

    /// Total volume moved across all channels
    pub fn total_volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    /// Check channel count and per-channel volumes
    pub fn validate(&self) -> Result<(), String> {
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(format!(
                "channels must be between 1 and {MAX_CHANNELS}, got {}",
                self.channels
            ));
        }
        if self.volumes.len() != self.channels as usize {
            return Err(format!(
                "{} volumes given for {} channels",
                self.volumes.len(),
                self.channels
            ));
        }
        if let Some(volume) = self.volumes.iter().find(|v| !v.is_finite() || **v < 0.0) {
            return Err(format!("invalid volume {volume}"));
        }
        Ok(())
    }
}

impl Default for PipetteRequest {
    fn default() -> Self {
        Self::uniform(4, 50.0, "Source_96:A1", "Dest_96:A1")
    }
}

/// Identity from the SiLAService feature plus FluentControl runtime state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,
    /// Server type
    pub server_type: String,
    /// Server version
    pub version: String,
    /// Server UUID
    pub uuid: String,
    /// FluentControl runtime state
    pub state: String,
    /// Methods FluentControl can run right now
    pub runnable_methods: Vec<String>,
}

/// Controller trait shared by all client implementations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Open the session
    async fn connect(&mut self) -> Result<(), ControllerError>;

    /// Release the session (leaves the vendor server running)
    async fn disconnect(&mut self) -> Result<(), ControllerError>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Query server identity
    async fn server_info(&mut self) -> Result<ServerInfo, ControllerError>;

    /// Run a multi-channel pipetting command
    async fn run_multichannel_pipette(
        &mut self,
        request: &PipetteRequest,
    ) -> Result<(), ControllerError>;

    /// Submit a worklist file for execution
    async fn execute_worklist(&mut self, path: &Path) -> Result<(), ControllerError>;

    /// Get controller type
    fn kind(&self) -> ControllerKind;

    /// Get endpoint description
    fn endpoint(&self) -> String;
}

/// Create a controller client for the given kind
///
/// `simulator` is only used for [`ControllerKind::Simulated`].
pub fn create_controller(
    kind: ControllerKind,
    params: ConnectionParams,
    simulator: SimulatorConfig,
) -> Box<dyn ControllerClient> {
    match kind {
        ControllerKind::Sila => Box::new(SilaController::new(params)),
        ControllerKind::Simulated => Box::new(SimulatedController::new(simulator).with_params(params)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_defaults() {
        let params = ConnectionParams::default();
        assert_eq!(params.host, "localhost");
        assert_eq!(params.port, 50051);
        assert!(params.insecure);
        assert_eq!(params.endpoint(), "localhost:50051");
        assert_eq!(params.uri(), "http://localhost:50051");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_params_validation() {
        let params = ConnectionParams::new("", 50051);
        assert!(matches!(params.validate(), Err(ControllerError::InvalidParams(_))));

        let params = ConnectionParams::new("localhost", 0);
        assert!(matches!(params.validate(), Err(ControllerError::InvalidParams(_))));

        let params = ConnectionParams::new("localhost", 50051).connect_timeout(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_params_uri() {
        let params = ConnectionParams::new("::1", 50052);
        assert_eq!(params.uri(), "http://[::1]:50052");

        let params = ConnectionParams::new("fluent.lab", 50052).tls(None);
        assert_eq!(params.uri(), "https://fluent.lab:50052");
    }

    #[test]
    fn test_bracketed_ipv6_host() {
        let params = ConnectionParams::new("[::1]", 50052);
        assert_eq!(params.bare_host(), "::1");
        assert_eq!(params.uri(), "http://[::1]:50052");
        assert_eq!(ConnectionParams::new("::1", 1).bare_host(), "::1");
        assert_eq!(ConnectionParams::new("fluent.lab", 1).bare_host(), "fluent.lab");
    }

    #[test]
    fn test_password_not_serialized() {
        let params = ConnectionParams::default().credentials("admin", "secret");
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("admin"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_pipette_request() {
        let req = PipetteRequest::uniform(4, 25.0, "Source_96:A1", "Dest_96:A1")
            .liquid_class("DMSO")
            .flow_rate(50.0);
        assert_eq!(req.volumes.len(), 4);
        assert!((req.total_volume() - 100.0).abs() < f64::EPSILON);
        assert_eq!(req.liquid_class, "DMSO");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_pipette_request_channel_bounds() {
        let mut req = PipetteRequest::uniform(MAX_CHANNELS, 10.0, "Source_96:A1", "Dest_96:A1");
        assert!(req.validate().is_ok());

        req.channels = MAX_CHANNELS + 1;
        assert!(req.validate().unwrap_err().contains("between 1 and 96"));

        req.channels = 0;
        assert!(req.validate().is_err());

        let req = PipetteRequest {
            volumes: vec![10.0, f64::NAN, 10.0, 10.0],
            ..PipetteRequest::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_controller() {
        let params = ConnectionParams::new("fluent.lab", 50052);
        let sila = create_controller(ControllerKind::Sila, params.clone(), SimulatorConfig::default());
        assert_eq!(sila.kind(), ControllerKind::Sila);
        assert_eq!(sila.endpoint(), "fluent.lab:50052");
        assert!(!sila.is_connected());

        let sim = create_controller(ControllerKind::Simulated, params, SimulatorConfig::default());
        assert_eq!(sim.kind(), ControllerKind::Simulated);
    }

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ControllerError::NotConnected.kind_name(), "not_connected");
        let err = ControllerError::Rejected {
            kind: RejectionKind::Validation,
            message: "bad".into(),
        };
        assert_eq!(err.kind_name(), "rejected");

        let denied = ControllerError::FileAccess {
            path: "locked.gwl".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(denied.kind_name(), "permission_denied");
        assert_eq!(err.to_string(), "Controller rejected command (validation error): bad");
    }
}
