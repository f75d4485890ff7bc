//! Scheduler and execution metrics.
//!
//! Everything here goes through the `metrics` facade. Nothing is exported unless the
//! host process installs a recorder; without one every call is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use cadence_core::telemetry::metrics::SchedulerMetrics;
//!
//! SchedulerMetrics::record_tick(12, 0, 0.004);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;
use std::time::{Duration, Instant};

static DESCRIBED: Once = Once::new();

/// Register metric descriptions with whatever recorder is installed.
///
/// Safe to call more than once.
pub fn describe_metrics() {
    DESCRIBED.call_once(|| {
        describe_counter!("cadence_scheduler_ticks_total", "Scheduler ticks that ran to completion");
        describe_counter!(
            "cadence_scheduler_ticks_skipped_total",
            "Ticks dropped because the previous tick was still running"
        );
        describe_histogram!("cadence_scheduler_tick_duration_seconds", "Wall time of a scheduler tick");
        describe_gauge!("cadence_scheduler_due_jobs", "Due jobs found by the last tick");
        describe_counter!(
            "cadence_scheduler_job_failures_total",
            "Due jobs a tick could not process"
        );

        describe_counter!("cadence_admissions_total", "Executions admitted for dispatch");
        describe_counter!("cadence_executions_skipped_total", "Executions skipped at admission");
        describe_counter!("cadence_executions_finished_total", "Executions reaching a terminal state");
        describe_histogram!("cadence_execution_duration_seconds", "Execution wall time");
        describe_counter!("cadence_execution_retries_total", "Retry executions scheduled");
        describe_counter!("cadence_execution_timeouts_total", "Executions terminated by timeout");
        describe_gauge!("cadence_executions_running", "Executions currently tracked as running");

        describe_counter!("cadence_notifications_total", "Notification deliveries by outcome");
        describe_counter!("cadence_errors_total", "Errors raised, by code");
        describe_counter!("cadence_store_writes_total", "Records written to the job store");
        describe_histogram!("cadence_operation_duration_seconds", "Wall time of timed operations");
    });
}

/// Metrics emitted by the scheduler loop.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record a completed tick. Admissions and skips are counted by the coordinator.
    pub fn record_tick(due: usize, failed: usize, duration_seconds: f64) {
        counter!("cadence_scheduler_ticks_total").increment(1);
        gauge!("cadence_scheduler_due_jobs").set(due as f64);
        if failed > 0 {
            counter!("cadence_scheduler_job_failures_total").increment(failed as u64);
        }
        histogram!("cadence_scheduler_tick_duration_seconds").record(duration_seconds);
    }

    /// Record a tick dropped by the single-flight guard.
    pub fn record_tick_overlap() {
        counter!("cadence_scheduler_ticks_skipped_total").increment(1);
    }
}

/// Metrics emitted by the execution coordinator.
pub struct ExecutionMetrics;

impl ExecutionMetrics {
    /// Record an admission by origin ("scheduled", "manual", "retry").
    pub fn record_admitted(origin: &'static str) {
        counter!("cadence_admissions_total", "origin" => origin).increment(1);
    }

    /// Record an execution skipped at admission.
    pub fn record_skipped(reason: &'static str) {
        counter!("cadence_executions_skipped_total", "reason" => reason).increment(1);
    }

    /// Record an execution reaching a terminal status.
    pub fn record_finished(status: &str, duration: Option<Duration>) {
        counter!("cadence_executions_finished_total", "status" => status.to_string()).increment(1);
        if let Some(duration) = duration {
            histogram!("cadence_execution_duration_seconds", "status" => status.to_string())
                .record(duration.as_secs_f64());
        }
    }

    pub fn record_retry(attempt: u32) {
        counter!("cadence_execution_retries_total", "attempt" => attempt.to_string()).increment(1);
    }

    pub fn record_timeout() {
        counter!("cadence_execution_timeouts_total").increment(1);
    }

    pub fn set_running(count: usize) {
        gauge!("cadence_executions_running").set(count as f64);
    }

    pub fn record_notification(kind: &'static str, delivered: bool) {
        counter!(
            "cadence_notifications_total",
            "kind" => kind,
            "outcome" => if delivered { "delivered" } else { "failed" },
        )
        .increment(1);
    }
}

/// Times an operation and records it into a histogram on [`finish`](Self::finish).
pub struct OperationTimer {
    start: Instant,
    operation_name: &'static str,
}

impl OperationTimer {
    /// Start timing an operation.
    pub fn start(operation_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation_name,
        }
    }

    /// Get elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Finish and record to `cadence_operation_duration_seconds`.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        histogram!("cadence_operation_duration_seconds", "operation" => self.operation_name)
            .record(duration.as_secs_f64());
        duration
    }
}
