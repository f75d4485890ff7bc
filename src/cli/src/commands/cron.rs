//! Cron expression commands.

use anyhow::{Context, Result};
use cadence_core::schedule::CronExpression;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CronCommands {
    /// Parse an expression and report whether it can ever fire
    Check {
        /// Cron expression (quote it: "*/5 * * * *")
        expression: String,
    },

    /// List the next fire times of an expression
    Next {
        /// Cron expression
        expression: String,

        /// Number of fire times to list
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Start instant (RFC 3339), defaults to now
        #[arg(long)]
        from: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct CronReport {
    expression: String,
    has_seconds: bool,
    next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Tabled)]
pub(crate) struct FireTime {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "At (UTC)")]
    pub at: String,
    #[tabled(rename = "In")]
    pub delta: String,
}

pub fn execute(cmd: CronCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        CronCommands::Check { expression } => check(&expression, format),
        CronCommands::Next { expression, count, from } => {
            let cron = CronExpression::parse(&expression)?;
            let from = parse_instant(from.as_deref())?;
            output::print_list(&fire_times(&cron, from, count), format)
        }
    }
}

fn check(expression: &str, format: OutputFormat) -> Result<()> {
    let cron = CronExpression::parse(expression)?;
    let report = CronReport {
        expression: cron.to_text(),
        has_seconds: cron.has_seconds(),
        next_run: cron.next_occurrence(Utc::now()),
    };

    match format {
        OutputFormat::Table => {
            output::print_success(&format!("'{}' is valid", report.expression));
            output::print_detail("Seconds field", report.has_seconds);
            match report.next_run {
                Some(at) => output::print_detail("Next run", at.to_rfc3339()),
                None => output::print_warning("expression never fires"),
            }
            Ok(())
        }
        _ => output::print_item(&report, format),
    }
}

/// Parse an optional RFC 3339 instant, falling back to the current time.
pub(crate) fn parse_instant(text: Option<&str>) -> Result<DateTime<Utc>> {
    match text {
        Some(text) => Ok(DateTime::parse_from_rfc3339(text)
            .with_context(|| format!("Invalid RFC 3339 timestamp '{}'", text))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

pub(crate) fn fire_times(cron: &CronExpression, from: DateTime<Utc>, count: usize) -> Vec<FireTime> {
    cron.upcoming(from, count)
        .into_iter()
        .enumerate()
        .map(|(i, at)| FireTime {
            index: i + 1,
            at: at.format("%Y-%m-%d %H:%M:%S").to_string(),
            delta: humanize(at - from),
        })
        .collect()
}

fn humanize(delta: chrono::Duration) -> String {
    let secs = delta.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60, secs % 60);
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{}s", seconds),
        (0, 0, _) => format!("{}m {}s", minutes, seconds),
        (0, _, _) => format!("{}h {}m", hours, minutes),
        _ => format!("{}d {}h", days, hours),
    }
}
