//! Job definition commands.
//!
//! Reads the same job definitions the server seeds from its configuration
//! and checks them without touching a store.

use anyhow::{Context, Result};
use cadence_core::config::JobSeed;
use cadence_core::jobs::{Job, UserId};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use super::cron::{fire_times, parse_instant};
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum JobCommands {
    /// Validate job definitions from a YAML or JSON file
    Check {
        /// File holding one definition or a list of them
        file: PathBuf,
    },

    /// Show upcoming runs for each job in a file
    Preview {
        /// File holding one definition or a list of them
        file: PathBuf,

        /// Runs to list per job
        #[arg(short = 'n', long, default_value = "3")]
        count: usize,

        /// Start instant (RFC 3339), defaults to now
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Schedule")]
    schedule: String,
    #[tabled(rename = "Type")]
    job_type: String,
    #[tabled(rename = "Retries")]
    max_retries: u32,
    #[tabled(rename = "Timeout (s)")]
    timeout: String,
    #[tabled(rename = "Active")]
    active: bool,
}

pub fn execute(cmd: JobCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        JobCommands::Check { file } => {
            let seeds = read_seeds(&file)?;
            let rows = seeds.iter().map(check_seed).collect::<Result<Vec<_>>>()?;
            output::print_list(&rows, format)?;
            if matches!(format, OutputFormat::Table) {
                output::print_success(&format!("{} job definition(s) are valid", rows.len()));
            }
            Ok(())
        }
        JobCommands::Preview { file, count, from } => {
            let from = parse_instant(from.as_deref())?;
            for seed in read_seeds(&file)? {
                if matches!(format, OutputFormat::Table) {
                    output::print_header(&format!("{} ({})", seed.name, seed.schedule));
                }
                output::print_list(&fire_times(&seed.schedule, from, count), format)?;
            }
            Ok(())
        }
    }
}

fn check_seed(seed: &JobSeed) -> Result<JobRow> {
    // Job::new applies the same name rules the service does
    let job = Job::new(
        seed.name.as_str(),
        seed.schedule.clone(),
        seed.configuration.clone(),
        seed.owner.map(UserId::from).unwrap_or_default(),
        chrono::Utc::now(),
    )
    .with_context(|| format!("Invalid job '{}'", seed.name))?;

    if seed.schedule.next_occurrence(chrono::Utc::now()).is_none() {
        output::print_warning(&format!("'{}' has a schedule that never fires", job.name()));
    }

    let configuration = job.configuration();
    Ok(JobRow {
        name: job.name().to_string(),
        schedule: job.schedule().to_text(),
        job_type: configuration.job_type().to_string(),
        max_retries: configuration.max_retries(),
        timeout: configuration
            .timeout()
            .map(|t| t.as_secs().to_string())
            .unwrap_or_else(|| "-".to_string()),
        active: seed.active,
    })
}

fn read_seeds(path: &Path) -> Result<Vec<JobSeed>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_seeds(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Accepts a single definition or a list, in YAML (a superset of JSON).
fn parse_seeds(content: &str) -> Result<Vec<JobSeed>> {
    if let Ok(seeds) = serde_yaml::from_str::<Vec<JobSeed>>(content) {
        return Ok(seeds);
    }
    Ok(vec![serde_yaml::from_str::<JobSeed>(content)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_and_list() {
        let single = r#"
name: nightly backup
schedule: "30 2 * * *"
configuration:
  kind:
    type: command
    command: pg_dump app
"#;
        assert_eq!(parse_seeds(single).unwrap().len(), 1);

        let list = format!("- {}", single.trim().replace('\n', "\n  "));
        let seeds = parse_seeds(&list).unwrap();
        assert_eq!(seeds[0].name, "nightly backup");
        assert!(seeds[0].active);
    }

    #[test]
    fn test_rejects_bad_schedule() {
        let text = "name: x\nschedule: \"61 * * * *\"\nconfiguration:\n  kind:\n    type: command\n    command: \"true\"\n";
        assert!(parse_seeds(text).is_err());
    }
}
