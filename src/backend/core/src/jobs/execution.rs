//! A single run attempt of a job and its lifecycle state machine.
//!
//! ```text
//! Pending ──start──▶ Running ──complete──▶ Completed
//!    │                  ├──────fail──────▶ Failed
//!    │                  ├─────cancel─────▶ Cancelled
//!    │                  └────timeout─────▶ Timeout
//!    ├──skip──▶ Skipped
//!    └──cancel/timeout──▶ Cancelled/Timeout
//! ```
//!
//! Terminal records never change again. A retry is a *new* record that points back
//! at the failed one through `retry_of`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use super::configuration::lenient_read;
use super::job::JobId;
use crate::error::{CadenceError, Result};

/// Free-form execution metadata.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for an execution, distinct from its job's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ExecutionId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status & Origin
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Admitted, waiting for the runner
    Pending,
    /// Runner is working on it
    Running,
    /// Finished successfully
    Completed,
    /// The job's own work failed
    Failed,
    /// Stopped on request
    Cancelled,
    /// Ran past its configured timeout
    Timeout,
    /// Due but deliberately not run
    Skipped,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    /// Pending or Running.
    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    pub fn has_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::Timeout)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// How an execution came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOrigin {
    Scheduled,
    Manual,
}

impl fmt::Display for ExecutionOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Execution
// ═══════════════════════════════════════════════════════════════════════════════

/// One run attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    id: ExecutionId,
    job_id: JobId,
    status: ExecutionStatus,
    origin: ExecutionOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    triggered_by: Option<String>,
    created_at: DateTime<Utc>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
    output: Option<String>,
    error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<String>,
    retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retry_of: Option<ExecutionId>,
    #[serde(default)]
    metadata: Metadata,
}

impl JobExecution {
    /// A fresh Pending execution. `started_at` is provisional until [`start`](Self::start).
    pub fn pending(
        job_id: JobId,
        origin: ExecutionOrigin,
        triggered_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            job_id,
            status: ExecutionStatus::Pending,
            origin,
            triggered_by,
            created_at: now,
            started_at: now,
            finished_at: None,
            duration_ms: None,
            output: None,
            error_message: None,
            progress: None,
            retry_count: 0,
            retry_of: None,
            metadata: Metadata::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Pending → Running.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(&[ExecutionStatus::Pending], "start")?;
        self.status = ExecutionStatus::Running;
        self.started_at = now;
        Ok(())
    }

    /// Running → Completed.
    pub fn complete(
        &mut self,
        output: Option<String>,
        metadata: Option<Metadata>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require(&[ExecutionStatus::Running], "complete")?;
        self.output = output;
        self.merge_metadata(metadata);
        self.finish(ExecutionStatus::Completed, now);
        Ok(())
    }

    /// Running → Failed. The message must be non-empty.
    pub fn fail(
        &mut self,
        error_message: &str,
        output: Option<String>,
        metadata: Option<Metadata>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if error_message.trim().is_empty() {
            return Err(CadenceError::missing_field("error_message"));
        }
        self.require(&[ExecutionStatus::Running], "fail")?;
        self.output = output;
        self.error_message = Some(error_message.to_string());
        self.merge_metadata(metadata);
        self.finish(ExecutionStatus::Failed, now);
        Ok(())
    }

    /// Pending/Running → Cancelled.
    pub fn cancel(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        self.require(&[ExecutionStatus::Pending, ExecutionStatus::Running], "cancel")?;
        self.error_message = Some(with_detail("Execution was cancelled", reason));
        self.finish(ExecutionStatus::Cancelled, now);
        Ok(())
    }

    /// Pending/Running → Timeout.
    pub fn timeout(&mut self, info: Option<&str>, now: DateTime<Utc>) -> Result<()> {
        self.require(&[ExecutionStatus::Pending, ExecutionStatus::Running], "time out")?;
        self.error_message = Some(with_detail("Execution timed out", info));
        self.finish(ExecutionStatus::Timeout, now);
        Ok(())
    }

    /// Pending → Skipped.
    pub fn skip(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.require(&[ExecutionStatus::Pending], "skip")?;
        self.error_message = Some(reason.to_string());
        self.finish(ExecutionStatus::Skipped, now);
        Ok(())
    }

    /// Bump the attempt counter. Does not change status.
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    /// The next attempt after this failed one: Pending, `retry_count + 1`, linked back.
    pub fn spawn_retry(&self, now: DateTime<Utc>) -> Result<JobExecution> {
        if !self.has_failed() {
            return Err(CadenceError::invalid_state_transition(
                "execution",
                self.status,
                "retry",
            ));
        }
        let mut next = Self::pending(self.job_id, self.origin, self.triggered_by.clone(), now);
        next.retry_count = self.retry_count;
        next.increment_retry();
        next.retry_of = Some(self.id);
        Ok(next)
    }

    /// Record a progress message (and optional metadata) while Running.
    pub fn update_progress(
        &mut self,
        message: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        self.require(&[ExecutionStatus::Running], "update progress of")?;
        self.progress = Some(message.into());
        self.merge_metadata(metadata);
        Ok(())
    }

    /// Set one metadata entry; rejected once terminal.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Result<()> {
        if self.is_terminal() {
            return Err(CadenceError::invalid_state_transition(
                "execution",
                self.status,
                "modify metadata of",
            ));
        }
        self.metadata.insert(key.into(), value.into());
        Ok(())
    }

    fn require(&self, allowed: &[ExecutionStatus], action: &'static str) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CadenceError::invalid_state_transition("execution", self.status, action))
        }
    }

    fn finish(&mut self, status: ExecutionStatus, now: DateTime<Utc>) {
        let finished_at = now.max(self.started_at);
        self.status = status;
        self.finished_at = Some(finished_at);
        self.duration_ms = Some((finished_at - self.started_at).num_milliseconds());
        self.progress = None;
    }

    fn merge_metadata(&mut self, metadata: Option<Metadata>) {
        if let Some(metadata) = metadata {
            self.metadata.extend(metadata);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn origin(&self) -> ExecutionOrigin {
        self.origin
    }

    pub fn triggered_by(&self) -> Option<&str> {
        self.triggered_by.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration_ms
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_ms.map(|ms| Duration::from_millis(ms.max(0) as u64))
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn progress(&self) -> Option<&str> {
        self.progress.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn retry_of(&self) -> Option<ExecutionId> {
        self.retry_of
    }

    pub fn metadata_map(&self) -> &Metadata {
        &self.metadata
    }

    /// Typed metadata lookup with the same lenient conversion as job parameters.
    pub fn metadata<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        lenient_read(self.metadata.get(key)?)
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }

    pub fn is_successful(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Failed or Timeout.
    pub fn has_failed(&self) -> bool {
        self.status.has_failed()
    }

    /// Time since start for in-flight executions, recorded duration otherwise.
    pub fn elapsed(&self, now: DateTime<Utc>) -> ChronoDuration {
        match self.finished_at {
            Some(finished) => finished - self.started_at,
            None => now - self.started_at,
        }
    }

    pub fn is_long_running(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.elapsed(now)
            .to_std()
            .map(|elapsed| elapsed > threshold)
            .unwrap_or(false)
    }

    /// Human-readable status line.
    pub fn status_description(&self) -> String {
        let detail = self.error_message.as_deref().unwrap_or("unknown reason");
        match self.status {
            ExecutionStatus::Pending => "Waiting to start".to_string(),
            ExecutionStatus::Running => match &self.progress {
                Some(progress) => format!("Currently running: {}", progress),
                None => "Currently running".to_string(),
            },
            ExecutionStatus::Completed => "Completed successfully".to_string(),
            ExecutionStatus::Failed => format!("Failed: {}", detail),
            ExecutionStatus::Cancelled => "Cancelled".to_string(),
            ExecutionStatus::Timeout => "Timed out".to_string(),
            ExecutionStatus::Skipped => format!("Skipped: {}", detail),
        }
    }
}

fn with_detail(base: &str, detail: Option<&str>) -> String {
    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("{}: {}", base, detail),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn running() -> JobExecution {
        let mut exec = JobExecution::pending(JobId::new(), ExecutionOrigin::Scheduled, None, t0());
        exec.start(t0()).unwrap();
        exec
    }

    #[test]
    fn test_start_only_from_pending() {
        let mut exec = running();
        let err = exec.start(t0()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
    }

    #[test]
    fn test_complete_sets_duration() {
        let mut exec = running();
        exec.complete(Some("ok".into()), None, t0() + ChronoDuration::milliseconds(1500))
            .unwrap();
        assert!(exec.is_successful());
        assert_eq!(exec.duration_ms(), Some(1500));
        assert_eq!(
            exec.finished_at().unwrap() - exec.started_at(),
            ChronoDuration::milliseconds(1500)
        );
    }

    #[test]
    fn test_complete_from_pending_is_rejected() {
        let mut exec = JobExecution::pending(JobId::new(), ExecutionOrigin::Manual, None, t0());
        assert!(exec.complete(None, None, t0()).is_err());
        assert_eq!(exec.status(), ExecutionStatus::Pending);
        assert_eq!(exec.duration_ms(), None);
    }

    #[test]
    fn test_fail_requires_message() {
        let mut exec = running();
        assert!(exec.fail("  ", None, None, t0()).is_err());
        assert!(exec.is_running());
        exec.fail("exit status 1", None, None, t0()).unwrap();
        assert!(exec.has_failed());
        assert_eq!(exec.status_description(), "Failed: exit status 1");
    }

    #[test]
    fn test_cancel_and_timeout_messages() {
        let mut exec = running();
        exec.cancel(Some("operator request"), t0()).unwrap();
        assert_eq!(exec.error_message(), Some("Execution was cancelled: operator request"));
        assert!(exec.cancel(None, t0()).is_err());

        let mut exec = running();
        exec.timeout(None, t0()).unwrap();
        assert_eq!(exec.error_message(), Some("Execution timed out"));
        assert!(exec.has_failed());
    }

    #[test]
    fn test_terminal_success_cannot_be_cancelled() {
        let mut exec = running();
        exec.complete(None, None, t0()).unwrap();
        assert!(exec.cancel(None, t0()).is_err());
        assert!(exec.timeout(None, t0()).is_err());
        assert_eq!(exec.status(), ExecutionStatus::Completed);
    }

    #[test]
    fn test_skip_only_from_pending() {
        let mut exec = JobExecution::pending(JobId::new(), ExecutionOrigin::Scheduled, None, t0());
        exec.skip("concurrent execution in progress", t0()).unwrap();
        assert_eq!(exec.status(), ExecutionStatus::Skipped);
        assert_eq!(exec.duration_ms(), Some(0));

        let mut exec = running();
        assert!(exec.skip("late", t0()).is_err());
    }

    #[test]
    fn test_spawn_retry_links_lineage() {
        let mut exec = JobExecution::pending(
            JobId::new(),
            ExecutionOrigin::Manual,
            Some("alice".into()),
            t0(),
        );
        exec.start(t0()).unwrap();
        exec.fail("boom", None, None, t0()).unwrap();

        let retry = exec.spawn_retry(t0()).unwrap();
        assert_eq!(retry.retry_count(), 1);
        assert_eq!(retry.retry_of(), Some(exec.id()));
        assert_eq!(retry.job_id(), exec.job_id());
        assert_eq!(retry.origin(), ExecutionOrigin::Manual);
        assert_eq!(retry.triggered_by(), Some("alice"));
        assert_ne!(retry.id(), exec.id());
    }

    #[test]
    fn test_spawn_retry_requires_failure() {
        let exec = running();
        assert!(exec.spawn_retry(t0()).is_err());
    }

    #[test]
    fn test_progress_and_metadata() {
        let mut exec = running();
        exec.update_progress("halfway", None).unwrap();
        exec.set_metadata("rows", "42").unwrap();
        assert_eq!(exec.status_description(), "Currently running: halfway");
        assert_eq!(exec.metadata::<u64>("rows"), Some(42));
        assert_eq!(exec.metadata::<u64>("missing"), None);

        let mut extra = Metadata::new();
        extra.insert("exit_code".into(), json!(0));
        exec.complete(None, Some(extra), t0()).unwrap();
        assert_eq!(exec.metadata::<i32>("exit_code"), Some(0));
        assert!(exec.set_metadata("late", 1).is_err());
        assert!(exec.progress().is_none());
    }

    #[test]
    fn test_is_long_running() {
        let exec = running();
        let later = t0() + ChronoDuration::minutes(10);
        assert!(exec.is_long_running(Duration::from_secs(300), later));
        assert!(!exec.is_long_running(Duration::from_secs(3600), later));
    }
}
