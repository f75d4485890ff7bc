//! Periodic polling for due jobs.
//!
//! The loop only decides *when* to look. Each tick fetches due jobs and hands them to
//! the [`ExecutionCoordinator`] concurrently (admission serializes per job, not
//! across jobs); runner work happens on the coordinator's
//! tasks, never on the loop. Ticks run on their own tasks behind a single-flight
//! guard: a tick that fires while the previous one is still fetching is dropped,
//! and the timer keeps going.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::SchedulerConfig;
use crate::coordinator::{Admission, ExecutionCoordinator};
use crate::error::Result;
use crate::telemetry::{OperationTimer, SchedulerMetrics};

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Due jobs fetched
    pub due: usize,
    /// Executions admitted and dispatched
    pub admitted: usize,
    /// Executions skipped by the concurrency check
    pub skipped: usize,
    /// Jobs whose admission errored
    pub failed: usize,
    /// True when the tick did nothing because another tick was in progress
    pub overlapped: bool,
}

impl TickReport {
    fn overlapped() -> Self {
        Self {
            overlapped: true,
            ..Self::default()
        }
    }
}

/// Counters across all ticks.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub ticks: Arc<AtomicU64>,
    pub overlaps: Arc<AtomicU64>,
    pub admitted: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub timeouts: Arc<AtomicU64>,
}

impl SchedulerStats {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn overlaps(&self) -> u64 {
        self.overlaps.load(Ordering::Relaxed)
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.admitted.fetch_add(report.admitted as u64, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
    }
}

/// Handle for controlling a running scheduler loop.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    stats: SchedulerStats,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Signal the loop to stop after its current wait.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Signal shutdown and wait for the loop task to exit.
    ///
    /// Executions already dispatched keep running on their own tasks.
    pub async fn stop(self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Scheduler loop task ended abnormally");
        }
    }

    /// Get scheduler statistics.
    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

/// Drives admission of due jobs on a fixed cadence.
pub struct SchedulerLoop {
    coordinator: Arc<ExecutionCoordinator>,
    config: SchedulerConfig,
    in_tick: AtomicBool,
    stats: SchedulerStats,
}

/// Clears the single-flight flag however the tick ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SchedulerLoop {
    pub fn new(coordinator: Arc<ExecutionCoordinator>, config: SchedulerConfig) -> Self {
        Self {
            coordinator,
            config,
            in_tick: AtomicBool::new(false),
            stats: SchedulerStats::default(),
        }
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    /// Run one fetch-and-admit pass.
    ///
    /// Only a failed due-jobs fetch is an error. A job whose admission fails is logged
    /// and counted; the rest of the batch still runs.
    pub async fn tick(&self) -> Result<TickReport> {
        if self
            .in_tick
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.overlaps.fetch_add(1, Ordering::Relaxed);
            SchedulerMetrics::record_tick_overlap();
            tracing::debug!("Previous tick still running, skipping");
            return Ok(TickReport::overlapped());
        }
        let _guard = TickGuard(&self.in_tick);

        let started = Instant::now();
        let now = self.coordinator.clock().now();
        let due = self
            .coordinator
            .store()
            .fetch_due_jobs(now, self.config.max_due_per_tick)
            .await?;

        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        let admissions = due
            .iter()
            .map(|job| self.coordinator.admit_scheduled(job.id(), now));
        let outcomes = futures::future::join_all(admissions).await;
        for (job, outcome) in due.iter().zip(outcomes) {
            match outcome {
                Ok(Some(Admission::Admitted(_))) => report.admitted += 1,
                Ok(Some(Admission::Skipped(_))) => report.skipped += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(job_id = %job.id(), job_name = %job.name(), error = %e, "Scheduled admission failed");
                }
            }
        }

        self.stats.record(&report);
        SchedulerMetrics::record_tick(report.due, report.failed, started.elapsed().as_secs_f64());
        if report.due > 0 {
            tracing::info!(
                due = report.due,
                admitted = report.admitted,
                skipped = report.skipped,
                failed = report.failed,
                "Scheduler tick"
            );
        }
        Ok(report)
    }

    /// Time out overdue executions. Returns how many were timed out.
    pub async fn sweep(&self) -> usize {
        let timer = OperationTimer::start("timeout_sweep");
        let now = self.coordinator.clock().now();
        let timed_out = self.coordinator.sweep_timeouts(now).await;
        timer.finish();
        if timed_out > 0 {
            self.stats.timeouts.fetch_add(timed_out as u64, Ordering::Relaxed);
            tracing::info!(timed_out, "Timeout sweep");
        }
        timed_out
    }

    /// Start ticking and sweeping, returning a handle for control.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(self.config.tick_interval());
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweeps = tokio::time::interval(self.config.sweep_interval());
            sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                tick_interval_secs = self.config.tick_interval_secs,
                sweep_interval_secs = self.config.sweep_interval_secs,
                max_due_per_tick = self.config.max_due_per_tick,
                "Scheduler loop started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Scheduler loop shutting down");
                            break;
                        }
                    }
                    _ = ticks.tick() => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = scheduler.tick().await {
                                tracing::error!(error = %e, "Scheduler tick failed");
                            }
                        });
                    }
                    _ = sweeps.tick() => {
                        let scheduler = Arc::clone(&self);
                        tokio::spawn(async move {
                            scheduler.sweep().await;
                        });
                    }
                }
            }

            tracing::info!("Scheduler loop stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            stats,
            task,
        }
    }
}
