//! The `Job` aggregate: schedule, configuration, lifecycle and rolling statistics.
//!
//! ```text
//! Draft ──activate──▶ Active ◀──resume── Paused
//!                       │ └────pause────▶ ▲
//!                       ├──deactivate──▶ Inactive
//!                       └──mark_error──▶ Error
//! (any non-Deleted) ──delete──▶ Deleted
//! ```
//!
//! `next_run_at` is set exactly when the job is Active. Every operation that can
//! change either one takes `now` from the caller.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::configuration::JobConfiguration;
use super::execution::{ExecutionStatus, JobExecution};
use crate::error::{CadenceError, ErrorCode, Result};
use crate::schedule::CronExpression;
use crate::validation::{check, MaxLength, Required, ValidationErrors};

/// Longest accepted job name.
pub const MAX_NAME_LENGTH: usize = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// Identification
// ═══════════════════════════════════════════════════════════════════════════════

entity_id! {
    /// Stable identifier of a job.
    JobId
}

entity_id! {
    /// Reference to the owning user (managed outside the engine).
    UserId
}

entity_id! {
    /// Reference to a team (managed outside the engine).
    TeamId
}

entity_id! {
    /// Reference to a category (managed outside the engine).
    CategoryId
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, never activated
    Draft,
    /// Scheduled; the only status with a next run
    Active,
    /// Temporarily stopped; resumable
    Paused,
    /// Switched off
    Inactive,
    /// Switched off because something is wrong with it
    Error,
    /// Soft-deleted; terminal
    Deleted,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Inactive => write!(f, "inactive"),
            Self::Error => write!(f, "error"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health
// ═══════════════════════════════════════════════════════════════════════════════

/// Thresholds for [`Job::health`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// How far back failures count
    pub window: ChronoDuration,
    /// Failures within the window that make a job unhealthy
    pub failure_threshold: u32,
    /// Below this many total runs a job is always healthy
    pub min_runs: u64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            window: ChronoDuration::hours(24),
            failure_threshold: 3,
            min_runs: 5,
        }
    }
}

/// Result of a health computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobHealth {
    pub is_healthy: bool,
    /// Failed or timed-out executions inside the window
    pub recent_failures: u32,
    /// Lifetime failure percentage (0-100)
    pub failure_rate: f64,
}

/// Point-in-time counters of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatistics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub average_duration_ms: Option<f64>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job
// ═══════════════════════════════════════════════════════════════════════════════

/// A scheduled job definition and its statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    name: String,
    description: Option<String>,
    schedule: CronExpression,
    configuration: JobConfiguration,
    status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status_reason: Option<String>,
    owner: UserId,
    team: Option<TeamId>,
    category: Option<CategoryId>,
    #[serde(default)]
    tags: Vec<String>,
    next_run_at: Option<DateTime<Utc>>,
    last_run_at: Option<DateTime<Utc>>,
    total_runs: u64,
    successful_runs: u64,
    failed_runs: u64,
    average_duration_ms: Option<f64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a Draft job.
    pub fn new(
        name: impl Into<String>,
        schedule: CronExpression,
        configuration: JobConfiguration,
        owner: UserId,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        validate_name(&name)?;

        Ok(Self {
            id: JobId::new(),
            name,
            description: None,
            schedule,
            configuration,
            status: JobStatus::Draft,
            status_reason: None,
            owner,
            team: None,
            category: None,
            tags: Vec::new(),
            next_run_at: None,
            last_run_at: None,
            total_runs: 0,
            successful_runs: 0,
            failed_runs: 0,
            average_duration_ms: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = normalize_description(Some(description.into()));
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_team(mut self, team: TeamId) -> Self {
        self.team = Some(team);
        self
    }

    pub fn with_category(mut self, category: CategoryId) -> Self {
        self.category = Some(category);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Make the job Active and compute its next run. Idempotent when already Active.
    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("activate")?;
        if self.status == JobStatus::Active {
            return Ok(());
        }
        let next = self.first_run_after(now)?;
        self.status = JobStatus::Active;
        self.status_reason = None;
        self.next_run_at = Some(next);
        self.touch(now);
        Ok(())
    }

    /// Active → Paused. No-op when already Paused.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.status {
            JobStatus::Paused => Ok(()),
            JobStatus::Active => {
                self.set_inactive_status(JobStatus::Paused, None, now);
                Ok(())
            }
            other => Err(CadenceError::invalid_state_transition("job", other, "pause")),
        }
    }

    /// Paused → Active. No-op from any other status.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobStatus::Paused {
            return Ok(());
        }
        let next = self.first_run_after(now)?;
        self.status = JobStatus::Active;
        self.next_run_at = Some(next);
        self.touch(now);
        Ok(())
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("deactivate")?;
        self.set_inactive_status(JobStatus::Inactive, None, now);
        Ok(())
    }

    /// Switch to Error, keeping `message` as the status reason.
    pub fn mark_error(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("mark error on")?;
        self.set_inactive_status(JobStatus::Error, Some(message.into()), now);
        Ok(())
    }

    /// Soft delete. Terminal.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("delete")?;
        self.set_inactive_status(JobStatus::Deleted, None, now);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the schedule if its text differs; recompute the next run when Active.
    ///
    /// On error (a schedule that never fires while Active) nothing changes.
    pub fn update_schedule(&mut self, schedule: CronExpression, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("reschedule")?;
        if schedule == self.schedule {
            return Ok(());
        }
        if self.status == JobStatus::Active {
            let next = next_run(&schedule, now)?;
            self.next_run_at = Some(next);
        }
        self.schedule = schedule;
        self.touch(now);
        Ok(())
    }

    pub fn update_configuration(&mut self, configuration: JobConfiguration, now: DateTime<Utc>) -> Result<()> {
        self.ensure_not_deleted("reconfigure")?;
        self.configuration = configuration;
        self.touch(now);
        Ok(())
    }

    /// Change any of name, description (empty clears it) and tags. Validates before
    /// applying anything.
    pub fn update_details(
        &mut self,
        name: Option<String>,
        description: Option<String>,
        tags: Option<Vec<String>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_not_deleted("update")?;
        let name = name.map(|n| n.trim().to_string());
        if let Some(name) = &name {
            validate_name(name)?;
        }

        if let Some(name) = name {
            self.name = name;
        }
        if description.is_some() {
            self.description = normalize_description(description);
        }
        if let Some(tags) = tags {
            self.tags = normalize_tags(tags);
        }
        self.touch(now);
        Ok(())
    }

    pub fn assign_team(&mut self, team: Option<TeamId>, now: DateTime<Utc>) {
        self.team = team;
        self.touch(now);
    }

    pub fn assign_category(&mut self, category: Option<CategoryId>, now: DateTime<Utc>) {
        self.category = category;
        self.touch(now);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution bookkeeping
    // ─────────────────────────────────────────────────────────────────────────

    /// Fold a terminal execution into the counters and recompute the next run.
    ///
    /// Completed runs count as successes and feed the average duration; Failed runs
    /// count as failures; Cancelled, Timeout and Skipped only count towards the total.
    pub fn record_execution(&mut self, execution: &JobExecution, now: DateTime<Utc>) -> Result<()> {
        if execution.job_id() != self.id {
            return Err(CadenceError::validation(format!(
                "Execution {} belongs to job {}, not {}",
                execution.id(),
                execution.job_id(),
                self.id
            )));
        }
        if !execution.is_terminal() {
            return Err(CadenceError::invalid_state_transition(
                "execution",
                execution.status(),
                "record",
            ));
        }

        self.total_runs += 1;
        self.last_run_at = Some(execution.started_at());
        match execution.status() {
            ExecutionStatus::Completed => {
                self.successful_runs += 1;
                if let Some(duration) = execution.duration_ms() {
                    let sample = duration as f64;
                    let average = self.average_duration_ms.unwrap_or(0.0);
                    self.average_duration_ms =
                        Some(average + (sample - average) / self.successful_runs as f64);
                }
            }
            ExecutionStatus::Failed => self.failed_runs += 1,
            _ => {}
        }

        self.schedule_next(now);
        self.touch(now);
        Ok(())
    }

    /// Move `next_run_at` to the first occurrence after `now` (Active jobs only).
    ///
    /// A schedule that has run out switches the job to Inactive.
    pub fn schedule_next(&mut self, now: DateTime<Utc>) {
        if self.status != JobStatus::Active {
            return;
        }
        match self.schedule.next_occurrence(now) {
            Some(next) => self.next_run_at = Some(next),
            None => self.set_inactive_status(
                JobStatus::Inactive,
                Some("schedule has no further occurrences".to_string()),
                now,
            ),
        }
    }

    /// Zero the counters. The only operation that lowers them.
    pub fn reset_statistics(&mut self, now: DateTime<Utc>) {
        self.total_runs = 0;
        self.successful_runs = 0;
        self.failed_runs = 0;
        self.average_duration_ms = None;
        self.last_run_at = None;
        self.touch(now);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Active && self.next_run_at.is_some_and(|next| next <= now)
    }

    /// Health from the job's counters and its recent executions.
    ///
    /// Healthy when fewer than `min_runs` runs exist, or when fewer than
    /// `failure_threshold` executions failed or timed out within the window.
    pub fn health(&self, recent: &[JobExecution], now: DateTime<Utc>, policy: &HealthPolicy) -> JobHealth {
        let since = now - policy.window;
        let recent_failures = recent
            .iter()
            .filter(|e| e.job_id() == self.id && e.has_failed() && e.started_at() >= since)
            .count() as u32;

        JobHealth {
            is_healthy: self.total_runs < policy.min_runs || recent_failures < policy.failure_threshold,
            recent_failures,
            failure_rate: self.failure_rate(),
        }
    }

    /// Percentage of runs that completed successfully.
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful_runs, self.total_runs)
    }

    /// Percentage of runs that failed.
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failed_runs, self.total_runs)
    }

    pub fn estimated_duration(&self) -> Option<Duration> {
        self.average_duration_ms
            .map(|ms| Duration::from_millis(ms.max(0.0).round() as u64))
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    pub fn statistics(&self) -> JobStatistics {
        JobStatistics {
            total_runs: self.total_runs,
            successful_runs: self.successful_runs,
            failed_runs: self.failed_runs,
            success_rate: self.success_rate(),
            failure_rate: self.failure_rate(),
            average_duration_ms: self.average_duration_ms,
            last_run_at: self.last_run_at,
            next_run_at: self.next_run_at,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schedule(&self) -> &CronExpression {
        &self.schedule
    }

    pub fn configuration(&self) -> &JobConfiguration {
        &self.configuration
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn status_reason(&self) -> Option<&str> {
        self.status_reason.as_deref()
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn team(&self) -> Option<TeamId> {
        self.team
    }

    pub fn category(&self) -> Option<CategoryId> {
        self.category
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn next_run_at(&self) -> Option<DateTime<Utc>> {
        self.next_run_at
    }

    pub fn last_run_at(&self) -> Option<DateTime<Utc>> {
        self.last_run_at
    }

    pub fn total_runs(&self) -> u64 {
        self.total_runs
    }

    pub fn successful_runs(&self) -> u64 {
        self.successful_runs
    }

    pub fn failed_runs(&self) -> u64 {
        self.failed_runs
    }

    pub fn average_duration_ms(&self) -> Option<f64> {
        self.average_duration_ms
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.status == JobStatus::Deleted
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn first_run_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        next_run(&self.schedule, now)
    }

    fn set_inactive_status(&mut self, status: JobStatus, reason: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.status_reason = reason;
        self.next_run_at = None;
        self.touch(now);
    }

    fn ensure_not_deleted(&self, action: &'static str) -> Result<()> {
        if self.is_deleted() {
            Err(CadenceError::invalid_state_transition("job", self.status, action))
        } else {
            Ok(())
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

fn next_run(schedule: &CronExpression, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    schedule.next_occurrence(now).ok_or_else(|| {
        CadenceError::new(
            ErrorCode::InvalidSchedule,
            format!("Cron expression '{}' has no future occurrences", schedule),
        )
    })
}

fn validate_name(name: &str) -> Result<()> {
    let mut errors = ValidationErrors::new();
    check(&mut errors, "name", name, Required);
    check(&mut errors, "name", name, MaxLength(MAX_NAME_LENGTH));
    errors.into_result()
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Trim, drop empties, dedupe case-insensitively keeping the first spelling.
fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
