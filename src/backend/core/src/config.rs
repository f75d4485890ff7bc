//! Configuration management.
//!
//! Values come from an optional file (format chosen by extension) layered under
//! `CADENCE__`-prefixed environment variables, e.g.
//! `CADENCE__SCHEDULER__TICK_INTERVAL_SECS=5`.

use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{CadenceError, Result};
use crate::jobs::{BackoffStrategy, HealthPolicy, JobConfiguration, RetryPolicy};
use crate::schedule::CronExpression;
use crate::telemetry::LoggingConfig;
use crate::validation::{check, OneOf, Required, ValidationErrors, ValidationRule};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CADENCE";

/// Accepted values for [`Config::environment`].
pub const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Scheduler loop configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Retry backoff configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Health computation thresholds
    #[serde(default)]
    pub health: HealthConfig,

    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Jobs seeded into the store at server start
    #[serde(default)]
    pub jobs: Vec<JobSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            health: HealthConfig::default(),
            runner: RunnerConfig::default(),
            logging: LoggingConfig::default(),
            jobs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between due-job polls
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Seconds between timeout sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound on jobs fetched per tick
    #[serde(default = "default_max_due_per_tick")]
    pub max_due_per_tick: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_due_per_tick: default_max_due_per_tick(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    /// Cap on any single retry delay
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> BackoffStrategy {
        BackoffStrategy::exponential(self.base_delay_secs, self.max_delay_secs)
    }

    /// Policy for a job allowing `max_retries` attempts.
    pub fn policy(&self, max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, self.backoff())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,

    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Jobs with fewer runs are reported healthy
    #[serde(default = "default_min_runs")]
    pub min_runs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            failure_threshold: default_failure_threshold(),
            min_runs: default_min_runs(),
        }
    }
}

impl HealthConfig {
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            window: ChronoDuration::hours(i64::from(self.window_hours)),
            failure_threshold: self.failure_threshold,
            min_runs: self.min_runs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Request timeout for HTTP jobs without their own timeout
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Shell used for script jobs without an interpreter
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Captured output is truncated to this many bytes
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            shell: default_shell(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl RunnerConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// A job definition seeded at server start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSeed {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    pub schedule: CronExpression,

    pub configuration: JobConfiguration,

    /// Owning user; a fresh id is generated when absent
    #[serde(default)]
    pub owner: Option<Uuid>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Activate immediately after creation
    #[serde(default = "default_seed_active")]
    pub active: bool,
}

// Default value functions
fn default_environment() -> String { "production".to_string() }
fn default_tick_interval_secs() -> u64 { 10 }
fn default_sweep_interval_secs() -> u64 { 30 }
fn default_max_due_per_tick() -> usize { 500 }
fn default_base_delay_secs() -> u64 { 5 }
fn default_max_delay_secs() -> u64 { 3600 }
fn default_window_hours() -> u32 { 24 }
fn default_failure_threshold() -> u32 { 3 }
fn default_min_runs() -> u64 { 5 }
fn default_http_timeout_secs() -> u64 { 300 }
fn default_shell() -> String { "/bin/sh".to_string() }
fn default_max_output_bytes() -> usize { 64 * 1024 }
fn default_seed_active() -> bool { true }

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment variables taking precedence.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.scheduler.tick_interval_secs == 0 {
            problems.push("scheduler.tick_interval_secs must be greater than zero".to_string());
        }
        if self.scheduler.sweep_interval_secs == 0 {
            problems.push("scheduler.sweep_interval_secs must be greater than zero".to_string());
        }
        if self.scheduler.max_due_per_tick == 0 {
            problems.push("scheduler.max_due_per_tick must be greater than zero".to_string());
        }
        if self.retry.base_delay_secs == 0 {
            problems.push("retry.base_delay_secs must be greater than zero".to_string());
        }
        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            problems.push("retry.base_delay_secs must not exceed retry.max_delay_secs".to_string());
        }
        if self.health.failure_threshold == 0 {
            problems.push("health.failure_threshold must be greater than zero".to_string());
        }
        if self.health.window_hours == 0 {
            problems.push("health.window_hours must be greater than zero".to_string());
        }
        if self.runner.max_output_bytes == 0 {
            problems.push("runner.max_output_bytes must be greater than zero".to_string());
        }
        if let Some(error) = OneOf(ENVIRONMENTS).validate(self.environment.as_str()) {
            problems.push(format!("environment: {}", error.message));
        }
        let mut seed_errors = ValidationErrors::new();
        for (index, seed) in self.jobs.iter().enumerate() {
            check(&mut seed_errors, &format!("jobs[{}].name", index), seed.name.as_str(), Required);
        }
        problems.extend(seed_errors.to_flat_messages());

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CadenceError::configuration(problems.join("; ")))
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}
