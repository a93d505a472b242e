//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Text and JSON output
//! - Logging setup

pub mod exit_codes;
pub mod logging;
pub mod output;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
pub use logging::{effective_level, init_logging};
pub use output::{format_error, format_report, format_server_info, format_worklist, OutputFormat};
