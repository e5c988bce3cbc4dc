//! workshopdb - workshop catalog snapshot builder
//!
//! Main entry point: argument parsing, tracing setup and exit-code policy.
//! Exit codes: 0 success, 1 validation failure or internal error, 2
//! user-initiated interrupt.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod build_cli;
mod check_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "workshopdb",
    about = "Workshop catalog snapshot builder",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Build or refresh a workshop metadata snapshot
    Build(build_cli::BuildCommand),

    /// Inspect an existing snapshot
    Check {
        /// Snapshot file to inspect
        path: PathBuf,
    },
}

/// Initialize tracing from the --log-level flag
///
/// Logs go to stderr so stdout stays machine-readable.
fn initialize_tracing(log_level: &LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_filter_directive()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Build(command) => command.execute().await,
        Command::Check { path } => check_cli::execute(&path),
    }
}
