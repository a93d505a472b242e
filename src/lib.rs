//! # Silaprobe Core Library
//!
//! Connection smoke test for Tecan Fluent liquid handlers driven through the
//! FluentControl SiLA2 connector:
//! - Connect to the SiLA2 server (host/port, optional TLS and UMS login)
//! - Run a multi-channel pipetting exercise
//! - Execute a worklist file
//! - Report pass/fail per step
//!
//! An in-process simulator stands in for the controller when no robot is
//! available.
//!
//! ## Example
//!
//! ```rust,no_run
//! use silaprobe_core::{ConnectionParams, ConnectionTester, PipetteRequest, SilaController, TestPlan};
//!
//! #[tokio::main]
//! async fn main() {
//!     let params = ConnectionParams::new("localhost", 50051);
//!     let mut tester = ConnectionTester::new(Box::new(SilaController::new(params)));
//!
//!     let plan = TestPlan::connect_only()
//!         .with_pipette(PipetteRequest::uniform(4, 50.0, "Source_96:A1", "Dest_96:A1"))
//!         .with_worklist("simple.gwl");
//!
//!     let report = tester.run(&plan).await;
//!     println!("{report}");
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, LoggingConfig};
pub use crate::core::controller::{
    create_controller, ConnectionParams, ControllerClient, ControllerError, ControllerKind,
    PipetteRequest, RejectionKind, ServerInfo, SilaController, SimulatedController,
    SimulatorConfig,
};
pub use crate::core::report::{Step, StepOutcome, StepResult, TestReport};
pub use crate::core::tester::{ConnectionTester, TestPlan};
pub use crate::core::worklist::{Worklist, WorklistCommand, WorklistError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
