//! CLI subcommand implementations.

pub mod backoff;
pub mod config;
pub mod cron;
pub mod job;
