//! Retry backoff preview.

use anyhow::{bail, Result};
use cadence_core::jobs::BackoffStrategy;
use clap::{Args, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StrategyKind {
    Fixed,
    Linear,
    Exponential,
}

#[derive(Args)]
pub struct BackoffArgs {
    /// Backoff strategy
    #[arg(short, long, value_enum, default_value = "exponential")]
    strategy: StrategyKind,

    /// Base delay in seconds (initial delay for linear)
    #[arg(short, long, default_value = "5")]
    base: u64,

    /// Cap in seconds for exponential, increment for linear
    #[arg(short, long, default_value = "3600")]
    max: u64,

    /// Number of retry attempts to show
    #[arg(short, long, default_value = "8")]
    attempts: u32,
}

#[derive(Debug, Serialize, Tabled)]
struct DelayRow {
    #[tabled(rename = "Attempt")]
    attempt: u32,
    #[tabled(rename = "Delay (s)")]
    delay_secs: u64,
    #[tabled(rename = "Elapsed (s)")]
    elapsed_secs: u64,
}

impl BackoffArgs {
    fn strategy(&self) -> BackoffStrategy {
        match self.strategy {
            StrategyKind::Fixed => BackoffStrategy::fixed(self.base),
            StrategyKind::Linear => BackoffStrategy::Linear {
                initial_delay_secs: self.base,
                increment_secs: self.max,
            },
            StrategyKind::Exponential => BackoffStrategy::exponential(self.base, self.max),
        }
    }
}

pub fn execute(args: BackoffArgs, format: OutputFormat) -> Result<()> {
    if args.attempts == 0 {
        bail!("--attempts must be at least 1");
    }
    output::print_list(&delays(&args.strategy(), args.attempts), format)
}

fn delays(strategy: &BackoffStrategy, attempts: u32) -> Vec<DelayRow> {
    let mut elapsed = 0u64;
    (1..=attempts)
        .map(|attempt| {
            let delay_secs = strategy.delay_for_attempt(attempt).as_secs();
            elapsed = elapsed.saturating_add(delay_secs);
            DelayRow {
                attempt,
                delay_secs,
                elapsed_secs: elapsed,
            }
        })
        .collect()
}
