//! Cadence CLI - inspect cron schedules, retry backoff, job definitions and
//! server configuration without running the server.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{backoff, config, cron, job};
use output::OutputFormat;

/// Cadence - cron scheduling and execution engine CLI
#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "Cadence - cron scheduling and execution engine",
    long_about = "Offline tooling for Cadence: evaluate cron expressions, preview retry backoff, check job definitions and show the effective server configuration.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cron expression tools
    #[command(subcommand)]
    Cron(cron::CronCommands),

    /// Preview retry delays
    Backoff(backoff::BackoffArgs),

    /// Job definition tools
    #[command(subcommand)]
    Job(job::JobCommands),

    /// Server configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let result = match cli.command {
        Commands::Cron(cmd) => cron::execute(cmd, format),
        Commands::Backoff(args) => backoff::execute(args, format),
        Commands::Job(cmd) => job::execute(cmd, format),
        Commands::Config(cmd) => config::execute(cmd, format),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
