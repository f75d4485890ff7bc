//! Integration tests for the scheduler loop.
//!
//! Tests cover:
//! - Due-job admission and next-run advancement
//! - Concurrency skips across ticks
//! - Per-job failure isolation
//! - Background loop start/stop

mod common;

use async_trait::async_trait;
use cadence_core::config::SchedulerConfig;
use cadence_core::coordinator::ExecutionCoordinator;
use cadence_core::error::{CadenceError, Result};
use cadence_core::jobs::{ExecutionId, ExecutionStatus, Job, JobExecution, JobId};
use cadence_core::pagination::OffsetPagination;
use cadence_core::scheduler::SchedulerLoop;
use cadence_core::store::{InMemoryJobStore, JobFilter, JobStore};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use common::*;
use std::sync::Arc;

fn scheduler(h: &Harness) -> SchedulerLoop {
    SchedulerLoop::new(Arc::clone(&h.coordinator), SchedulerConfig::default())
}

#[tokio::test]
async fn test_tick_admits_due_job_once() {
    let (runner, _started) = ScriptedRunner::new(vec![]);
    let h = Harness::new(runner);
    let job = h.active_job(command()).await;
    let scheduler = scheduler(&h);
    let mut events = h.coordinator.events().subscribe();

    // Not due before 11:00
    assert_eq!(scheduler.tick().await.unwrap().due, 0);

    h.clock.advance(ChronoDuration::hours(1));
    let report = scheduler.tick().await.unwrap();
    assert_eq!((report.due, report.admitted, report.skipped, report.failed), (1, 1, 0, 0));

    // Next run moved forward before the execution even finished
    let rescheduled = h.job(&job).await;
    assert_eq!(
        rescheduled.next_run_at(),
        Some(Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap())
    );
    assert_eq!(scheduler.tick().await.unwrap().due, 0);

    let completed = next_completion(&mut events).await;
    assert_eq!(completed.status, ExecutionStatus::Completed);
    assert_eq!(h.job(&job).await.total_runs(), 1);
    assert_eq!(scheduler.stats().admitted(), 1);
}

#[tokio::test]
async fn test_overrunning_job_is_skipped_next_tick() {
    let (runner, mut started) = BlockingRunner::new();
    let h = Harness::new(runner);
    h.active_job(command()).await;
    let scheduler = scheduler(&h);

    h.clock.advance(ChronoDuration::hours(1));
    assert_eq!(scheduler.tick().await.unwrap().admitted, 1);
    let running = next_start(&mut started).await;

    h.clock.advance(ChronoDuration::hours(1));
    let report = scheduler.tick().await.unwrap();
    assert_eq!((report.due, report.admitted, report.skipped), (1, 0, 1));

    h.coordinator.cancel_execution(running, None).await.unwrap();
}

#[tokio::test]
async fn test_paused_and_draft_jobs_are_not_due() {
    let (runner, _started) = ScriptedRunner::new(vec![]);
    let h = Harness::new(runner);
    let mut paused = h.active_job(command()).await;
    paused.pause(t0()).unwrap();
    h.store.save_job(&paused).await.unwrap();
    let draft = Job::new("draft", cadence_core::schedule::CronExpression::every_minute(), command(), cadence_core::jobs::UserId::new(), t0()).unwrap();
    h.store.save_job(&draft).await.unwrap();

    h.clock.advance(ChronoDuration::days(1));
    let report = scheduler(&h).tick().await.unwrap();
    assert_eq!(report.due, 0);
}

// ============================================================================
// Failure isolation
// ============================================================================

/// Delegates to the in-memory store but cannot load one particular job.
struct BrokenJobStore {
    inner: InMemoryJobStore,
    broken: parking_lot::Mutex<Option<JobId>>,
}

#[async_trait]
impl JobStore for BrokenJobStore {
    async fn fetch_due_jobs(&self, as_of: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        self.inner.fetch_due_jobs(as_of, limit).await
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<Job>> {
        if *self.broken.lock() == Some(job_id) {
            return Err(CadenceError::storage("row is corrupt"));
        }
        self.inner.fetch_job(job_id).await
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.inner.save_job(job).await
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.inner.list_jobs(filter).await
    }

    async fn purge_job(&self, job_id: JobId) -> Result<bool> {
        self.inner.purge_job(job_id).await
    }

    async fn fetch_running_execution(&self, job_id: JobId) -> Result<Option<JobExecution>> {
        self.inner.fetch_running_execution(job_id).await
    }

    async fn fetch_execution(&self, execution_id: ExecutionId) -> Result<Option<JobExecution>> {
        self.inner.fetch_execution(execution_id).await
    }

    async fn save_execution(&self, execution: &JobExecution) -> Result<()> {
        self.inner.save_execution(execution).await
    }

    async fn list_executions(&self, job_id: JobId, pagination: &OffsetPagination) -> Result<(Vec<JobExecution>, u64)> {
        self.inner.list_executions(job_id, pagination).await
    }

    async fn executions_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<Vec<JobExecution>> {
        self.inner.executions_since(job_id, since).await
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_one_failing_job_does_not_stop_the_tick() {
    let store = Arc::new(BrokenJobStore {
        inner: InMemoryJobStore::new(),
        broken: parking_lot::Mutex::new(None),
    });
    let clock = cadence_core::clock::ManualClock::new(t0());
    let (runner, _started) = ScriptedRunner::new(vec![]);
    let coordinator = Arc::new(ExecutionCoordinator::new(store.clone(), runner, Arc::new(clock.clone())));

    let mut ids = Vec::new();
    for name in ["first", "second", "third"] {
        let mut job = Job::new(name, cadence_core::schedule::CronExpression::hourly(), command(), cadence_core::jobs::UserId::new(), t0()).unwrap();
        job.activate(t0()).unwrap();
        store.save_job(&job).await.unwrap();
        ids.push(job.id());
    }
    *store.broken.lock() = Some(ids[1]);

    clock.advance(ChronoDuration::hours(1));
    let scheduler = SchedulerLoop::new(coordinator, SchedulerConfig::default());
    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.due, 3);
    assert_eq!(report.admitted, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(scheduler.stats().failed(), 1);
}

// ============================================================================
// Background loop
// ============================================================================

#[tokio::test]
async fn test_started_loop_runs_due_jobs() {
    let (runner, _started) = ScriptedRunner::new(vec![]);
    let h = Harness::new(runner);
    let job = h.active_job(command()).await;
    h.clock.advance(ChronoDuration::hours(1));
    let mut events = h.coordinator.events().subscribe();

    let handle = Arc::new(scheduler(&h)).start();
    let completed = next_completion(&mut events).await;
    assert_eq!(completed.job_id, job.id());

    handle.stop().await;
}
