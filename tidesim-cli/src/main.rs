//! Tidesim CLI - Command-line interface
//!
//! Runs the reference congestion-control scenarios and ad-hoc single flows.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tidesim_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "tidesim")]
#[command(about = "Discrete-event simulator for TCP-like congestion control")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory for the per-run trace logs
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level, cli.logs_dir.as_deref(), &cli.command.run_name())
        .context("failed to initialize tracing")?;

    commands::handle_command(cli.command)
}
