//! Silaprobe - connection smoke test for FluentControl SiLA2 servers
//!
//! Connects to the controller, runs a multi-channel pipetting exercise and a
//! worklist, and exits with a code that says which step failed.

use clap::{Args, Parser, Subcommand};
use silaprobe_core::cli::{
    effective_level, format_error, format_report, format_server_info, format_worklist,
    init_logging, print_exit_codes, CliResult, OutputFormat,
};
use silaprobe_core::config::{self, AppConfig, ConfigError};
use silaprobe_core::core::controller::{create_controller, PipetteRequest, MAX_CHANNELS};
use silaprobe_core::core::tester::{ConnectionTester, TestPlan};
use silaprobe_core::core::worklist::Worklist;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Silaprobe CLI
#[derive(Parser, Debug)]
#[command(
    name = "silaprobe",
    version,
    about = "Connection smoke test for Tecan FluentControl SiLA2 servers",
    long_about = None
)]
struct Cli {
    /// Controller host
    #[arg(short = 'H', long, global = true, env = "SILAPROBE_HOST")]
    host: Option<String>,

    /// SiLA2 server port
    #[arg(short, long, global = true, env = "SILAPROBE_PORT")]
    port: Option<u16>,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true, env = "SILAPROBE_CONFIG")]
    config: Option<PathBuf>,

    /// Run against the in-process simulator
    #[arg(long, global = true)]
    simulate: bool,

    /// Output format
    #[arg(short, long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Verbose output (-vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Skip remaining steps after the first failure
    #[arg(long, global = true)]
    fail_fast: bool,

    /// Use TLS
    #[arg(long, global = true)]
    secure: bool,

    /// CA certificate (PEM) to trust; implies --secure
    #[arg(long, global = true, value_name = "PEM")]
    tls_ca: Option<PathBuf>,

    /// Connection timeout in seconds
    #[arg(long, global = true)]
    connect_timeout: Option<u64>,

    /// Per-command timeout in seconds
    #[arg(long, global = true)]
    operation_timeout: Option<u64>,

    /// UMS user name
    #[arg(long, global = true, env = "SILAPROBE_USER")]
    username: Option<String>,

    /// UMS password
    #[arg(long, global = true, env = "SILAPROBE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Do not send StartFluentControl after connecting
    #[arg(long, global = true)]
    no_start: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full test: connect, pipette, worklist if configured
    Check {
        /// Worklist to execute (overrides config)
        #[arg(long)]
        worklist: Option<PathBuf>,

        /// Also read server identity
        #[arg(long)]
        info: bool,

        #[command(flatten)]
        pipette: PipetteArgs,
    },

    /// Connect only
    Connect,

    /// Connect and run the pipetting exercise
    Pipette(PipetteArgs),

    /// Connect and execute a worklist
    Worklist {
        /// Worklist file
        path: PathBuf,
    },

    /// Connect and print server identity
    Info,

    /// Parse a worklist locally and print its commands
    Inspect {
        /// Worklist file
        path: PathBuf,
    },

    /// Print the effective configuration
    Config {
        /// Print the config file path instead
        #[arg(long, conflicts_with = "init")]
        path: bool,

        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },

    /// Print exit code table
    ExitCodes,
}

/// Pipetting overrides
#[derive(Args, Debug, Default)]
struct PipetteArgs {
    /// Channels to use
    #[arg(long)]
    channels: Option<u32>,

    /// Volume in µL; once for all channels or once per channel
    #[arg(long = "volume")]
    volumes: Vec<f64>,

    /// Source labware:well
    #[arg(long)]
    source: Option<String>,

    /// Destination labware:well
    #[arg(long)]
    destination: Option<String>,

    /// Liquid class
    #[arg(long)]
    liquid_class: Option<String>,

    /// Flow rate in µL/s
    #[arg(long)]
    flow_rate: Option<f64>,
}

impl PipetteArgs {
    fn apply(&self, request: &mut PipetteRequest) -> Result<(), String> {
        let out_of_range = |n: usize| format!("channels must be between 1 and {MAX_CHANNELS}, got {n}");
        if let Some(channels) = self.channels {
            if channels == 0 || channels > MAX_CHANNELS {
                return Err(out_of_range(channels as usize));
            }
            let volume = request.volumes.first().copied().unwrap_or(50.0);
            request.channels = channels;
            request.volumes = vec![volume; channels as usize];
        }

        match self.volumes.as_slice() {
            [] => {}
            [volume] => request.volumes = vec![*volume; request.channels as usize],
            volumes => {
                if self.channels.is_some_and(|c| c as usize != volumes.len()) {
                    return Err(format!(
                        "{} volumes given for {} channels",
                        volumes.len(),
                        request.channels
                    ));
                }
                request.channels = u32::try_from(volumes.len())
                    .ok()
                    .filter(|n| *n <= MAX_CHANNELS)
                    .ok_or_else(|| out_of_range(volumes.len()))?;
                request.volumes = volumes.to_vec();
            }
        }

        if let Some(source) = &self.source {
            request.source.clone_from(source);
        }
        if let Some(destination) = &self.destination {
            request.destination.clone_from(destination);
        }
        if let Some(liquid_class) = &self.liquid_class {
            request.liquid_class.clone_from(liquid_class);
        }
        if let Some(flow_rate) = self.flow_rate {
            request.flow_rate = flow_rate;
        }
        Ok(())
    }
}

/// Layer global flags over the loaded config
fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> Result<(), String> {
    let connection = &mut config.connection;
    if let Some(host) = &cli.host {
        connection.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        connection.port = port;
    }
    if cli.secure || cli.tls_ca.is_some() {
        connection.insecure = false;
    }
    if let Some(ca) = &cli.tls_ca {
        connection.ca_cert = Some(ca.clone());
    }
    if let Some(secs) = cli.connect_timeout {
        connection.connect_timeout_secs = secs;
    }
    if cli.operation_timeout.is_some() {
        connection.operation_timeout_secs = cli.operation_timeout;
    }
    if let Some(username) = &cli.username {
        connection.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        connection.password = Some(password.clone());
    }
    if cli.no_start {
        connection.start_fluent = false;
    }

    if cli.simulate {
        config.run.simulate = true;
    }
    if cli.fail_fast {
        config.run.fail_fast = true;
    }

    match &cli.command {
        Commands::Check { worklist, info, pipette } => {
            if let Some(path) = worklist {
                config.worklist.path = Some(path.clone());
            }
            if *info {
                config.run.server_info = true;
            }
            pipette.apply(&mut config.pipette)?;
        }
        Commands::Pipette(pipette) => pipette.apply(&mut config.pipette)?,
        _ => {}
    }
    Ok(())
}

/// Run a plan and write its report to `out`
///
/// A failed step is already visible in the report, so the result comes back
/// marked as reported.
async fn run_plan(
    config: &AppConfig,
    plan: &TestPlan,
    format: OutputFormat,
    out: &mut impl Write,
) -> CliResult {
    let controller = create_controller(
        config.controller_kind(),
        config.connection.clone(),
        config.simulator.clone(),
    );
    let mut tester = ConnectionTester::new(controller);
    let report = tester.run(plan).await;

    let rendered = match (tester.server(), plan.server_info && report.passed()) {
        (Some(info), true) if plan.pipette.is_none() && plan.worklist.is_none() => {
            format_server_info(&report.endpoint, info, format)
        }
        _ => format_report(&report, format),
    };
    if let Err(e) = writeln!(out, "{rendered}") {
        return CliResult::from(e);
    }
    CliResult::from_report(&report).reported()
}

/// Write a fresh config file from defaults plus command-line flags
fn init_config(cli: &Cli) -> CliResult {
    let mut config = AppConfig::default();
    if let Err(msg) = apply_overrides(cli, &mut config) {
        return CliResult::invalid_args(msg);
    }
    let target = cli.config.clone().or_else(config::default_config_path);
    if let Some(path) = target.as_deref().filter(|p| p.exists()) {
        return CliResult::from(&ConfigError::Invalid(format!(
            "{} already exists",
            path.display()
        )));
    }
    match config.save(target.as_deref()) {
        Ok(path) => {
            println!("{}", path.display());
            CliResult::success()
        }
        Err(e) => CliResult::from(&e),
    }
}

async fn run(cli: Cli) -> CliResult {
    match &cli.command {
        Commands::ExitCodes => {
            print_exit_codes();
            return CliResult::success();
        }
        Commands::Config { init: true, .. } => return init_config(&cli),
        _ => {}
    }

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return CliResult::from(&e),
    };
    if let Err(msg) = apply_overrides(&cli, &mut config) {
        return CliResult::invalid_args(msg);
    }

    let level = effective_level(&config.logging, cli.verbose, cli.quiet);
    let _guard = match init_logging(&config.logging, &level) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: {e:#}");
            None
        }
    };

    if let Err(e) = config.validate() {
        return CliResult::from(&e);
    }

    let base = TestPlan::connect_only().fail_fast(config.run.fail_fast);
    let plan = match &cli.command {
        Commands::Check { .. } => config.test_plan(),
        Commands::Connect => base,
        Commands::Pipette(_) => base.with_pipette(config.pipette.clone()),
        Commands::Worklist { path } => base.with_worklist(path.clone()),
        Commands::Info => base.with_server_info(),
        Commands::Inspect { path } => {
            return match Worklist::load(path) {
                Ok(worklist) => {
                    println!("{}", format_worklist(path, &worklist, cli.format));
                    CliResult::success()
                }
                Err(e) => CliResult::from(&e),
            };
        }
        Commands::Config { path: true, .. } => {
            return match cli.config.clone().or_else(config::default_config_path) {
                Some(path) => {
                    println!("{}", path.display());
                    CliResult::success()
                }
                None => CliResult::from(&ConfigError::NoConfigDir),
            };
        }
        Commands::Config { .. } => {
            return match config.to_toml() {
                Ok(text) => {
                    print!("{text}");
                    CliResult::success()
                }
                Err(e) => CliResult::from(&e),
            };
        }
        Commands::ExitCodes => return CliResult::success(),
    };
    run_plan(&config, &plan, cli.format, &mut std::io::stdout()).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = cli.format;

    let result = run(cli).await;
    if result.is_unreported_error() {
        match format {
            OutputFormat::Text => eprintln!("{}", format_error(&result, format)),
            OutputFormat::Json => println!("{}", format_error(&result, format)),
        }
    }
    result.to_exit_code()
}
