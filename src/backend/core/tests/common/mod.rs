//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cadence_core::clock::ManualClock;
use cadence_core::coordinator::ExecutionCoordinator;
use cadence_core::error::Result;
use cadence_core::events::{DomainEvent, EventEnvelope, ExecutionCompleted};
use cadence_core::jobs::{BackoffStrategy, ExecutionId, Job, JobConfiguration, UserId};
use cadence_core::runner::{JobRunner, RunOutcome, RunRequest};
use cadence_core::schedule::CronExpression;
use cadence_core::store::{InMemoryJobStore, JobStore};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

/// Runner that replays scripted outcomes (success once the script runs out) and
/// reports every start.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<RunOutcome>>>,
    started: mpsc::UnboundedSender<ExecutionId>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Result<RunOutcome>>) -> (Arc<Self>, mpsc::UnboundedReceiver<ExecutionId>) {
        let (started, rx) = mpsc::unbounded_channel();
        let runner = Arc::new(Self {
            script: Mutex::new(script.into()),
            started,
        });
        (runner, rx)
    }

    pub fn always_failing(count: usize) -> (Arc<Self>, mpsc::UnboundedReceiver<ExecutionId>) {
        Self::new((0..count).map(|i| Ok(RunOutcome::failure(format!("attempt {} failed", i)))).collect())
    }
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let _ = self.started.send(request.execution_id);
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(RunOutcome::success("ok")))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Runner that only returns once its execution is cancelled.
pub struct BlockingRunner {
    started: mpsc::UnboundedSender<ExecutionId>,
}

impl BlockingRunner {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ExecutionId>) {
        let (started, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { started }), rx)
    }
}

#[async_trait]
impl JobRunner for BlockingRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let _ = self.started.send(request.execution_id);
        request.cancel.cancelled().await;
        Ok(RunOutcome::failure("interrupted"))
    }

    fn name(&self) -> &'static str {
        "blocking"
    }
}

pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub clock: ManualClock,
    pub coordinator: Arc<ExecutionCoordinator>,
}

impl Harness {
    pub fn new(runner: Arc<dyn JobRunner>) -> Self {
        let store = Arc::new(InMemoryJobStore::new());
        let clock = ManualClock::new(t0());
        let coordinator = Arc::new(
            ExecutionCoordinator::new(store.clone(), runner, Arc::new(clock.clone()))
                .with_backoff(BackoffStrategy::fixed(0)),
        );
        Self { store, clock, coordinator }
    }

    /// Save an Active job with `configuration`, due at its first hourly occurrence.
    pub async fn active_job(&self, configuration: JobConfiguration) -> Job {
        let mut job = Job::new("integration job", CronExpression::hourly(), configuration, UserId::new(), t0()).unwrap();
        job.activate(t0()).unwrap();
        self.store.save_job(&job).await.unwrap();
        job
    }

    pub async fn job(&self, job: &Job) -> Job {
        self.store.fetch_job(job.id()).await.unwrap().unwrap()
    }
}

pub fn command() -> JobConfiguration {
    JobConfiguration::command("true").unwrap()
}

/// Next ExecutionCompleted event, failing the test after five seconds.
pub async fn next_completion(events: &mut broadcast::Receiver<EventEnvelope>) -> ExecutionCompleted {
    loop {
        let envelope = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for an execution to finish")
            .expect("event bus closed");
        if let DomainEvent::ExecutionCompleted(completed) = envelope.event {
            return completed;
        }
    }
}

pub async fn next_start(started: &mut mpsc::UnboundedReceiver<ExecutionId>) -> ExecutionId {
    tokio::time::timeout(Duration::from_secs(5), started.recv())
        .await
        .expect("timed out waiting for the runner to start")
        .expect("runner dropped")
}
