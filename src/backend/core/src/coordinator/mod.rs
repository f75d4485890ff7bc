//! Execution coordination: admission, dispatch, timeouts, cancellation and retries.
//!
//! # Locking
//!
//! Every read-modify-write of a job or of one of its executions happens under that
//! job's async mutex. This makes the concurrency check and the creation of the new
//! execution a single step, and serializes `record_execution` per job. Runner work
//! happens outside the lock.
//!
//! Terminal transitions (runner result, timeout sweep, external cancel) reload the
//! execution under the lock and do nothing when it is already terminal or gone, so
//! whichever arrives first wins and the rest are no-ops.
//!
//! ```text
//! admit ──▶ Pending ──dispatch──▶ Running ──runner──▶ Completed / Failed
//!   │                               ├──sweep────────▶ Timeout
//!   └──▶ Skipped                    └──cancel───────▶ Cancelled
//!
//! Failed / Timeout with attempts left ──(backoff)──▶ new Pending (retry_of = failed)
//! ```

mod registry;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use self::registry::RunningRegistry;
use crate::clock::Clock;
use crate::error::{CadenceError, Result};
use crate::events::{EventBus, ExecutionCompleted};
use crate::jobs::{
    BackoffStrategy, ExecutionId, ExecutionOrigin, ExecutionStatus, Job, JobExecution, JobId,
    Metadata, RetryPolicy,
};
use crate::notify::{LogNotifier, NotificationKind, Notifier};
use crate::runner::{JobRunner, RunOutcome, RunRequest};
use crate::store::JobStore;
use crate::telemetry::ExecutionMetrics;

/// Skip reason recorded when a non-concurrent job already has an execution in flight.
pub const CONCURRENT_EXECUTION_REASON: &str = "concurrent execution in progress";

// ═══════════════════════════════════════════════════════════════════════════════
// Admission
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of asking to run a job.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A new Pending execution, persisted
    Admitted(JobExecution),
    /// A Skipped execution, persisted and recorded on the job
    Skipped(JobExecution),
}

impl Admission {
    pub fn execution(&self) -> &JobExecution {
        match self {
            Self::Admitted(execution) | Self::Skipped(execution) => execution,
        }
    }

    pub fn into_execution(self) -> JobExecution {
        match self {
            Self::Admitted(execution) | Self::Skipped(execution) => execution,
        }
    }

    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// How an execution ends.
#[derive(Debug, Clone)]
enum Resolution {
    Complete { output: Option<String>, metadata: Metadata },
    Fail { error: String, output: Option<String>, metadata: Metadata },
    Cancel { reason: Option<String> },
    Timeout { info: String },
}

impl Resolution {
    fn from_outcome(outcome: Result<RunOutcome>) -> Self {
        match outcome {
            Ok(RunOutcome { output, error: None, metadata }) => Self::Complete { output, metadata },
            Ok(RunOutcome { output, error: Some(error), metadata }) => Self::Fail {
                error: if error.trim().is_empty() { "job failed".to_string() } else { error },
                output,
                metadata,
            },
            Err(e) => {
                let mut metadata = Metadata::new();
                metadata.insert("error_code".to_string(), e.code().to_string().into());
                Self::Fail {
                    error: e.internal_message().unwrap_or(e.user_message()).to_string(),
                    output: None,
                    metadata,
                }
            }
        }
    }

    fn apply(self, execution: &mut JobExecution, now: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Complete { output, metadata } => execution.complete(output, Some(metadata), now),
            Self::Fail { error, output, metadata } => execution.fail(&error, output, Some(metadata), now),
            Self::Cancel { reason } => execution.cancel(reason.as_deref(), now),
            Self::Timeout { info } => execution.timeout(Some(&info), now),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters for the coordinator's lifetime.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorStats {
    pub admitted: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub timed_out: Arc<AtomicU64>,
    pub cancelled: Arc<AtomicU64>,
    pub retries_scheduled: Arc<AtomicU64>,
}

impl CoordinatorStats {
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    pub fn cancelled(&self) -> u64 {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn retries_scheduled(&self) -> u64 {
        self.retries_scheduled.load(Ordering::Relaxed)
    }

    fn record_terminal(&self, status: ExecutionStatus) {
        let counter = match status {
            ExecutionStatus::Completed => &self.completed,
            ExecutionStatus::Failed => &self.failed,
            ExecutionStatus::Timeout => &self.timed_out,
            ExecutionStatus::Cancelled => &self.cancelled,
            ExecutionStatus::Skipped => &self.skipped,
            ExecutionStatus::Pending | ExecutionStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Execution Coordinator
// ═══════════════════════════════════════════════════════════════════════════════

/// Gates concurrency per job and owns the execution lifecycle after admission.
///
/// Always used behind an `Arc`: dispatch and retries run on spawned tasks that keep
/// the coordinator alive.
pub struct ExecutionCoordinator {
    store: Arc<dyn JobStore>,
    runner: Arc<dyn JobRunner>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    backoff: BackoffStrategy,
    job_locks: DashMap<JobId, Arc<Mutex<()>>>,
    running: RunningRegistry,
    stats: CoordinatorStats,
}

impl ExecutionCoordinator {
    pub fn new(store: Arc<dyn JobStore>, runner: Arc<dyn JobRunner>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            runner,
            notifier: Arc::new(LogNotifier),
            clock,
            events: EventBus::default(),
            backoff: BackoffStrategy::default(),
            job_locks: DashMap::new(),
            running: RunningRegistry::default(),
            stats: CoordinatorStats::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Executions dispatched and not yet terminal.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_tracking(&self, execution_id: ExecutionId) -> bool {
        self.running.contains(execution_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retry policy
    // ─────────────────────────────────────────────────────────────────────────

    /// The job's retry policy under this coordinator's backoff.
    pub fn retry_policy(&self, job: &Job) -> RetryPolicy {
        RetryPolicy::new(job.configuration().max_retries(), self.backoff.clone())
    }

    /// True iff the execution failed or timed out and the job allows another attempt.
    pub fn should_retry(&self, job: &Job, execution: &JobExecution) -> bool {
        self.retry_policy(job).should_retry(execution)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.backoff.delay_for_attempt(attempt)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Admission
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a Pending execution for `job`, or a Skipped one when the job disallows
    /// concurrency and already has an execution in flight. Does not dispatch.
    pub async fn admit(
        &self,
        job: &Job,
        origin: ExecutionOrigin,
        triggered_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Admission> {
        let _guard = self.lock_job(job.id()).await;
        let execution = JobExecution::pending(job.id(), origin, triggered_by, now);
        self.admit_locked(job, execution, now).await
    }

    /// Scheduled admission of a due job: reload it under the lock, move its next run
    /// forward, admit and dispatch. Returns `None` if the job is gone or no longer due.
    pub async fn admit_scheduled(self: &Arc<Self>, job_id: JobId, now: DateTime<Utc>) -> Result<Option<Admission>> {
        let guard = self.lock_job(job_id).await;
        let Some(mut job) = self.store.fetch_job(job_id).await? else {
            return Ok(None);
        };
        if !job.is_due(now) {
            return Ok(None);
        }

        job.schedule_next(now);
        self.store.save_job(&job).await?;

        let execution = JobExecution::pending(job_id, ExecutionOrigin::Scheduled, None, now);
        let admission = self.admit_locked(&job, execution, now).await?;
        drop(guard);

        if let Admission::Admitted(execution) = &admission {
            self.dispatch(execution, &job);
        }
        Ok(Some(admission))
    }

    /// Manual run of a job regardless of its schedule. Dispatches when admitted.
    pub async fn trigger(self: &Arc<Self>, job_id: JobId, triggered_by: Option<String>) -> Result<Admission> {
        let now = self.clock.now();
        let guard = self.lock_job(job_id).await;
        let job = self
            .store
            .fetch_job(job_id)
            .await?
            .ok_or_else(|| CadenceError::job_not_found(job_id))?;
        if job.is_deleted() {
            return Err(CadenceError::invalid_state_transition("job", job.status(), "trigger"));
        }

        let execution = JobExecution::pending(job_id, ExecutionOrigin::Manual, triggered_by, now);
        let admission = self.admit_locked(&job, execution, now).await?;
        drop(guard);

        if let Admission::Admitted(execution) = &admission {
            self.dispatch(execution, &job);
        }
        Ok(admission)
    }

    /// Check-and-create. Caller holds the job lock.
    async fn admit_locked(&self, job: &Job, mut execution: JobExecution, now: DateTime<Utc>) -> Result<Admission> {
        let origin = match execution.origin() {
            _ if execution.retry_of().is_some() => "retry",
            ExecutionOrigin::Scheduled => "scheduled",
            ExecutionOrigin::Manual => "manual",
        };

        if !job.configuration().allow_concurrent() {
            if let Some(in_flight) = self.store.fetch_running_execution(job.id()).await? {
                execution.skip(CONCURRENT_EXECUTION_REASON, now)?;
                tracing::info!(
                    job_id = %job.id(),
                    execution_id = %execution.id(),
                    in_flight = %in_flight.id(),
                    origin,
                    "Skipped execution: concurrent execution in progress"
                );
                ExecutionMetrics::record_skipped("concurrent");
                self.commit_terminal(&execution, now).await?;
                return Ok(Admission::Skipped(execution));
            }
        }

        self.store.save_execution(&execution).await?;
        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
        ExecutionMetrics::record_admitted(origin);
        tracing::info!(
            job_id = %job.id(),
            execution_id = %execution.id(),
            origin,
            attempt = execution.retry_count(),
            "Admitted execution"
        );
        Ok(Admission::Admitted(execution))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dispatch
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand a Pending execution to the runner on its own task.
    pub fn dispatch(self: &Arc<Self>, execution: &JobExecution, job: &Job) -> JoinHandle<()> {
        let cancel = self.running.register(execution.id(), job.id());
        ExecutionMetrics::set_running(self.running.len());

        let coordinator = Arc::clone(self);
        let request = RunRequest {
            job_id: job.id(),
            execution_id: execution.id(),
            attempt: execution.retry_count(),
            configuration: job.configuration().clone(),
            cancel,
        };
        tokio::spawn(async move {
            let execution_id = request.execution_id;
            if let Err(e) = coordinator.run_execution(request).await {
                tracing::error!(execution_id = %execution_id, error = %e, "Execution pipeline failed");
            }
        })
    }

    async fn run_execution(self: Arc<Self>, request: RunRequest) -> Result<()> {
        let (job_id, execution_id) = (request.job_id, request.execution_id);

        {
            let _guard = self.lock_job(job_id).await;
            let Some(mut execution) = self.store.fetch_execution(execution_id).await? else {
                self.untrack(execution_id);
                return Ok(());
            };
            if execution.status() != ExecutionStatus::Pending {
                // Cancelled or timed out before it got going
                self.untrack(execution_id);
                return Ok(());
            }

            let now = self.clock.now();
            execution.start(now)?;
            self.store.save_execution(&execution).await?;
            let deadline = request
                .configuration
                .timeout()
                .and_then(|timeout| ChronoDuration::from_std(timeout).ok())
                .and_then(|timeout| now.checked_add_signed(timeout));
            self.running.set_deadline(execution_id, deadline);
        }

        tracing::debug!(job_id = %job_id, execution_id = %execution_id, attempt = request.attempt, "Execution started");
        let outcome = self.runner.run(request).await;
        self.resolve(job_id, execution_id, Resolution::from_outcome(outcome)).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timeouts & cancellation
    // ─────────────────────────────────────────────────────────────────────────

    /// Force a Running execution past its timeout into Timeout.
    ///
    /// Returns the updated execution, or `None` when nothing was due (not running, not
    /// over time, or already finished concurrently). The runner is signalled to stop.
    pub async fn handle_timeout(
        self: &Arc<Self>,
        execution: &JobExecution,
        elapsed: Duration,
        configured_timeout: Duration,
    ) -> Result<Option<JobExecution>> {
        if !execution.is_running() || elapsed <= configured_timeout {
            return Ok(None);
        }
        let info = format!(
            "exceeded timeout of {}s after {}s",
            configured_timeout.as_secs(),
            elapsed.as_secs()
        );
        let resolved = self
            .resolve(execution.job_id(), execution.id(), Resolution::Timeout { info })
            .await?;
        if resolved.is_some() {
            ExecutionMetrics::record_timeout();
            tracing::warn!(
                job_id = %execution.job_id(),
                execution_id = %execution.id(),
                elapsed_secs = elapsed.as_secs(),
                "Execution timed out"
            );
        }
        Ok(resolved)
    }

    /// Time out every tracked execution whose deadline passed before `now`.
    ///
    /// Executions that finished in the meantime are skipped without error.
    pub async fn sweep_timeouts(self: &Arc<Self>, now: DateTime<Utc>) -> usize {
        let mut timed_out = 0;
        for (execution_id, job_id) in self.running.overdue(now) {
            let execution = match self.store.fetch_execution(execution_id).await {
                Ok(Some(execution)) => execution,
                Ok(None) => {
                    self.untrack(execution_id);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, job_id = %job_id, error = %e, "Timeout sweep could not load execution");
                    continue;
                }
            };
            let Some(timeout) = self.configured_timeout(job_id).await else {
                continue;
            };
            let elapsed = execution.elapsed(now).to_std().unwrap_or_default();
            match self.handle_timeout(&execution, elapsed, timeout).await {
                Ok(Some(_)) => timed_out += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, error = %e, "Timeout sweep failed for execution");
                }
            }
        }
        let pruned = self.prune_idle_locks();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned idle job locks");
        }
        timed_out
    }

    async fn configured_timeout(&self, job_id: JobId) -> Option<Duration> {
        match self.store.fetch_job(job_id).await {
            Ok(Some(job)) => job.configuration().timeout(),
            _ => None,
        }
    }

    /// Cancel a Pending or Running execution. The record changes first; the runner is
    /// signalled afterwards and may take its time to stop.
    pub async fn cancel_execution(self: &Arc<Self>, execution_id: ExecutionId, reason: Option<String>) -> Result<JobExecution> {
        let execution = self
            .store
            .fetch_execution(execution_id)
            .await?
            .ok_or_else(|| CadenceError::execution_not_found(execution_id))?;
        if execution.is_terminal() {
            return Err(CadenceError::invalid_state_transition("execution", execution.status(), "cancel"));
        }

        match self
            .resolve(execution.job_id(), execution_id, Resolution::Cancel { reason })
            .await?
        {
            Some(cancelled) => {
                tracing::info!(job_id = %cancelled.job_id(), execution_id = %execution_id, "Execution cancelled");
                Ok(cancelled)
            }
            None => {
                let current = self
                    .store
                    .fetch_execution(execution_id)
                    .await?
                    .ok_or_else(|| CadenceError::execution_not_found(execution_id))?;
                Err(CadenceError::invalid_state_transition("execution", current.status(), "cancel"))
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Terminal transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a terminal transition under the job lock. `None` when the execution is
    /// already terminal or no longer exists.
    async fn resolve(
        self: &Arc<Self>,
        job_id: JobId,
        execution_id: ExecutionId,
        resolution: Resolution,
    ) -> Result<Option<JobExecution>> {
        let interrupting = matches!(resolution, Resolution::Cancel { .. } | Resolution::Timeout { .. });

        let (execution, job) = {
            let _guard = self.lock_job(job_id).await;
            let Some(mut execution) = self.store.fetch_execution(execution_id).await? else {
                self.untrack(execution_id);
                return Ok(None);
            };
            if execution.is_terminal() {
                return Ok(None);
            }

            let now = self.clock.now();
            resolution.apply(&mut execution, now)?;
            let job = self.commit_terminal(&execution, now).await?;
            (execution, job)
        };

        if let Some(entry) = self.running.remove(execution_id) {
            if interrupting {
                entry.cancel.cancel();
            }
        }
        ExecutionMetrics::set_running(self.running.len());

        if let Some(job) = job {
            if self.should_retry(&job, &execution) {
                self.schedule_retry(execution.clone());
            }
        }
        Ok(Some(execution))
    }

    /// Persist a terminal execution and fold it into its job. Caller holds the job lock.
    ///
    /// Returns the updated job, or `None` if the job has been purged.
    async fn commit_terminal(&self, execution: &JobExecution, now: DateTime<Utc>) -> Result<Option<Job>> {
        self.store.save_execution(execution).await?;
        self.stats.record_terminal(execution.status());
        ExecutionMetrics::record_finished(&execution.status().to_string(), execution.duration());

        let job = match self.store.fetch_job(execution.job_id()).await? {
            Some(mut job) => {
                job.record_execution(execution, now)?;
                self.store.save_job(&job).await?;
                Some(job)
            }
            None => {
                tracing::debug!(execution_id = %execution.id(), "Job gone before execution finished");
                None
            }
        };

        tracing::info!(
            job_id = %execution.job_id(),
            execution_id = %execution.id(),
            status = %execution.status(),
            duration_ms = execution.duration_ms(),
            attempt = execution.retry_count(),
            "Execution finished"
        );
        self.events.publish(ExecutionCompleted::from_execution(execution), now);
        if let Some(job) = &job {
            self.notify(job, execution);
        }
        Ok(job)
    }

    fn notify(&self, job: &Job, execution: &JobExecution) {
        if !job.configuration().notification().applies_to(execution.status()) {
            return;
        }
        let Some(kind) = NotificationKind::for_status(execution.status()) else {
            return;
        };

        let notifier = Arc::clone(&self.notifier);
        let (job, execution) = (job.clone(), execution.clone());
        tokio::spawn(async move {
            match notifier.notify(&job, &execution).await {
                Ok(()) => ExecutionMetrics::record_notification(kind.as_str(), true),
                Err(e) => {
                    ExecutionMetrics::record_notification(kind.as_str(), false);
                    tracing::warn!(
                        job_id = %job.id(),
                        execution_id = %execution.id(),
                        notifier = notifier.name(),
                        error = %e,
                        "Notification failed"
                    );
                }
            }
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Retries
    // ─────────────────────────────────────────────────────────────────────────

    fn schedule_retry(self: &Arc<Self>, failed: JobExecution) {
        let attempt = failed.retry_count() + 1;
        let delay = self.retry_delay(attempt);
        self.stats.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        ExecutionMetrics::record_retry(attempt);
        tracing::info!(
            job_id = %failed.job_id(),
            execution_id = %failed.id(),
            attempt,
            delay_secs = delay.as_secs(),
            "Retry scheduled"
        );

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = coordinator.admit_retry(&failed).await {
                tracing::warn!(job_id = %failed.job_id(), execution_id = %failed.id(), error = %e, "Retry admission failed");
            }
        });
    }

    async fn admit_retry(self: &Arc<Self>, failed: &JobExecution) -> Result<()> {
        let guard = self.lock_job(failed.job_id()).await;
        let job = match self.store.fetch_job(failed.job_id()).await? {
            Some(job) if !job.is_deleted() => job,
            _ => return Ok(()),
        };

        let now = self.clock.now();
        let retry = failed.spawn_retry(now)?;
        let admission = self.admit_locked(&job, retry, now).await?;
        drop(guard);

        if let Admission::Admitted(execution) = &admission {
            self.dispatch(execution, &job);
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locking
    // ─────────────────────────────────────────────────────────────────────────

    /// Serialize a read-modify-write of `job_id` with admissions and terminal commits.
    pub(crate) async fn lock_job(&self, job_id: JobId) -> OwnedMutexGuard<()> {
        let lock = self.job_locks.entry(job_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Signal every tracked execution of a purged job to stop and drop its lock entry.
    ///
    /// The runners' results land on missing records and are discarded.
    pub fn forget_job(&self, job_id: JobId) {
        for entry in self.running.remove_job(job_id) {
            entry.cancel.cancel();
        }
        ExecutionMetrics::set_running(self.running.len());
        // Held or awaited locks stay; sweep_timeouts prunes them later
        self.job_locks
            .remove_if(&job_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Drop lock entries nobody holds or waits on. Returns how many were removed.
    pub(crate) fn prune_idle_locks(&self) -> usize {
        let before = self.job_locks.len();
        self.job_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.job_locks.len())
    }

    fn untrack(&self, execution_id: ExecutionId) {
        self.running.remove(execution_id);
        ExecutionMetrics::set_running(self.running.len());
    }
}
