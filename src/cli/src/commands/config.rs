//! Server configuration commands.
//!
//! Resolves configuration exactly as `cadence-server` does: an optional file
//! overlaid with `CADENCE__*` environment variables.

use anyhow::{Context, Result};
use cadence_core::config::Config;
use clap::Subcommand;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "CADENCE_CONFIG")]
        file: Option<String>,
    },

    /// Validate the effective configuration
    Validate {
        /// Configuration file (TOML, YAML or JSON)
        #[arg(short, long, env = "CADENCE_CONFIG")]
        file: Option<String>,
    },

    /// Print the built-in defaults
    Defaults,
}

pub fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show { file } => {
            let config = load(file.as_deref())?;
            show(&config, format)
        }
        ConfigCommands::Validate { file } => {
            let config = load(file.as_deref())?;
            output::print_success(&format!(
                "configuration is valid ({} environment, {} seeded job(s))",
                config.environment,
                config.jobs.len()
            ));
            Ok(())
        }
        ConfigCommands::Defaults => show(&Config::default(), format),
    }
}

fn load(file: Option<&str>) -> Result<Config> {
    match file {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {}", path)),
        None => Config::load().context("Failed to load configuration from environment"),
    }
}

fn show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header("Cadence Configuration");
            output::print_detail("environment", &config.environment);
            output::print_detail("scheduler.tick_interval_secs", config.scheduler.tick_interval_secs);
            output::print_detail("scheduler.sweep_interval_secs", config.scheduler.sweep_interval_secs);
            output::print_detail("scheduler.max_due_per_tick", config.scheduler.max_due_per_tick);
            output::print_detail("retry.base_delay_secs", config.retry.base_delay_secs);
            output::print_detail("retry.max_delay_secs", config.retry.max_delay_secs);
            output::print_detail("health.window_hours", config.health.window_hours);
            output::print_detail("health.failure_threshold", config.health.failure_threshold);
            output::print_detail("health.min_runs", config.health.min_runs);
            output::print_detail("runner.http_timeout_secs", config.runner.http_timeout_secs);
            output::print_detail("runner.shell", &config.runner.shell);
            output::print_detail("runner.max_output_bytes", config.runner.max_output_bytes);
            output::print_detail("jobs", config.jobs.len());
            println!();
            Ok(())
        }
        _ => output::print_item(config, format),
    }
}
