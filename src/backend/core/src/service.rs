//! Application service: the operations the API layer calls.
//!
//! Every job mutation runs under the coordinator's per-job lock, so a pause or a
//! schedule change never interleaves with an admission or a result being recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::JobSeed;
use crate::coordinator::{Admission, ExecutionCoordinator};
use crate::error::{CadenceError, Result};
use crate::events::JobCreated;
use crate::jobs::{
    CategoryId, ExecutionId, HealthPolicy, Job, JobConfiguration, JobExecution, JobHealth, JobId,
    JobStatistics, TeamId, UserId,
};
use crate::pagination::{OffsetPagination, Page};
use crate::schedule::CronExpression;
use crate::store::{JobFilter, JobStore};

/// Input for [`JobService::create_job`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schedule: CronExpression,
    pub configuration: JobConfiguration,
    pub owner: UserId,
    #[serde(default)]
    pub team: Option<TeamId>,
    #[serde(default)]
    pub category: Option<CategoryId>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Activate right away instead of leaving the job in Draft
    #[serde(default)]
    pub activate: bool,
}

impl NewJob {
    pub fn new(
        name: impl Into<String>,
        schedule: CronExpression,
        configuration: JobConfiguration,
        owner: UserId,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            schedule,
            configuration,
            owner,
            team: None,
            category: None,
            tags: Vec::new(),
            activate: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
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

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn activated(mut self) -> Self {
        self.activate = true;
        self
    }
}

impl From<JobSeed> for NewJob {
    fn from(seed: JobSeed) -> Self {
        let owner = seed.owner.map(UserId::from).unwrap_or_default();
        let mut job = NewJob::new(seed.name, seed.schedule, seed.configuration, owner).with_tags(seed.tags);
        job.description = seed.description;
        job.activate = seed.active;
        job
    }
}

/// Job management and execution control over a store and a coordinator.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    coordinator: Arc<ExecutionCoordinator>,
    health: HealthPolicy,
}

impl JobService {
    pub fn new(coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self {
            store: Arc::clone(coordinator.store()),
            coordinator,
            health: HealthPolicy::default(),
        }
    }

    pub fn with_health_policy(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    fn now(&self) -> DateTime<Utc> {
        self.coordinator.clock().now()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Jobs
    // ─────────────────────────────────────────────────────────────────────────

    /// Create and persist a job, then publish `JobCreated`.
    pub async fn create_job(&self, request: NewJob) -> Result<Job> {
        let now = self.now();
        let mut job = Job::new(request.name, request.schedule, request.configuration, request.owner, now)?
            .with_tags(request.tags);
        if let Some(description) = request.description {
            job = job.with_description(description);
        }
        if let Some(team) = request.team {
            job = job.with_team(team);
        }
        if let Some(category) = request.category {
            job = job.with_category(category);
        }
        if request.activate {
            job.activate(now)?;
        }

        self.store.save_job(&job).await?;
        self.coordinator.events().publish(JobCreated::from_job(&job), now);
        tracing::info!(
            job_id = %job.id(),
            job_name = %job.name(),
            schedule = %job.schedule(),
            status = %job.status(),
            "Job created"
        );
        Ok(job)
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job> {
        self.store
            .fetch_job(job_id)
            .await?
            .ok_or_else(|| CadenceError::job_not_found(job_id))
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.store.list_jobs(filter).await
    }

    /// Active jobs due at the current instant, earliest first.
    pub async fn get_jobs_due(&self, limit: usize) -> Result<Vec<Job>> {
        self.store.fetch_due_jobs(self.now(), limit).await
    }

    pub async fn activate(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "activate", |job, now| job.activate(now)).await
    }

    pub async fn pause(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "pause", |job, now| job.pause(now)).await
    }

    pub async fn resume(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "resume", |job, now| job.resume(now)).await
    }

    pub async fn deactivate(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "deactivate", |job, now| job.deactivate(now)).await
    }

    pub async fn mark_error(&self, job_id: JobId, message: impl Into<String>) -> Result<Job> {
        let message = message.into();
        self.modify(job_id, "mark_error", move |job, now| job.mark_error(message, now))
            .await
    }

    /// Soft delete. Executions stay queryable; pending retries are dropped.
    pub async fn delete(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "delete", |job, now| job.delete(now)).await
    }

    /// Hard delete of the job and its executions. Returns whether it existed.
    pub async fn purge(&self, job_id: JobId) -> Result<bool> {
        let existed = {
            let _guard = self.coordinator.lock_job(job_id).await;
            self.store.purge_job(job_id).await?
        };
        self.coordinator.forget_job(job_id);
        if existed {
            tracing::info!(job_id = %job_id, "Job purged");
        }
        Ok(existed)
    }

    pub async fn update_schedule(&self, job_id: JobId, schedule: CronExpression) -> Result<Job> {
        self.modify(job_id, "update_schedule", move |job, now| job.update_schedule(schedule, now))
            .await
    }

    pub async fn update_configuration(&self, job_id: JobId, configuration: JobConfiguration) -> Result<Job> {
        self.modify(job_id, "update_configuration", move |job, now| {
            job.update_configuration(configuration, now)
        })
        .await
    }

    pub async fn update_details(
        &self,
        job_id: JobId,
        name: Option<String>,
        description: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Job> {
        self.modify(job_id, "update_details", move |job, now| {
            job.update_details(name, description, tags, now)
        })
        .await
    }

    pub async fn reset_statistics(&self, job_id: JobId) -> Result<Job> {
        self.modify(job_id, "reset_statistics", |job, now| {
            job.reset_statistics(now);
            Ok(())
        })
        .await
    }

    /// Load, mutate and save under the job lock. Nothing is saved if `change` fails.
    async fn modify<F>(&self, job_id: JobId, operation: &'static str, change: F) -> Result<Job>
    where
        F: FnOnce(&mut Job, DateTime<Utc>) -> Result<()>,
    {
        let _guard = self.coordinator.lock_job(job_id).await;
        let mut job = self.get_job(job_id).await?;
        let previous = job.status();

        change(&mut job, self.now())?;
        self.store.save_job(&job).await?;

        tracing::info!(
            job_id = %job_id,
            operation,
            from = %previous,
            status = %job.status(),
            "Job updated"
        );
        Ok(job)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Executions
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a job now, outside its schedule. Concurrency rules still apply.
    pub async fn trigger_manual_execution(&self, job_id: JobId, triggered_by: Option<String>) -> Result<Admission> {
        self.coordinator.trigger(job_id, triggered_by).await
    }

    pub async fn cancel_execution(&self, execution_id: ExecutionId, reason: Option<String>) -> Result<JobExecution> {
        self.coordinator.cancel_execution(execution_id, reason).await
    }

    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<JobExecution> {
        self.store
            .fetch_execution(execution_id)
            .await?
            .ok_or_else(|| CadenceError::execution_not_found(execution_id))
    }

    /// A page of the job's executions, newest first. `page` is 1-indexed and
    /// `page_size` is clamped to 1..=100.
    pub async fn get_execution_history(&self, job_id: JobId, page: u64, page_size: u64) -> Result<Page<JobExecution>> {
        self.get_job(job_id).await?;
        let pagination = OffsetPagination::new(page, page_size);
        let (items, total) = self.store.list_executions(job_id, &pagination).await?;
        Ok(Page::new(items, pagination.metadata(total)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Health & statistics
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn compute_health(&self, job_id: JobId) -> Result<JobHealth> {
        let job = self.get_job(job_id).await?;
        let now = self.now();
        let recent = self.store.executions_since(job_id, now - self.health.window).await?;
        Ok(job.health(&recent, now, &self.health))
    }

    pub async fn job_statistics(&self, job_id: JobId) -> Result<JobStatistics> {
        Ok(self.get_job(job_id).await?.statistics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::jobs::JobStatus;
    use crate::runner::DispatchRunner;
    use crate::store::InMemoryJobStore;
    use chrono::TimeZone;

    fn service() -> JobService {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap());
        let coordinator = ExecutionCoordinator::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(DispatchRunner::new()),
            Arc::new(clock),
        );
        JobService::new(Arc::new(coordinator))
    }

    fn new_job() -> NewJob {
        NewJob::new(
            "nightly export",
            CronExpression::daily(),
            JobConfiguration::command("true").unwrap(),
            UserId::new(),
        )
    }

    #[tokio::test]
    async fn test_create_publishes_event() {
        let service = service();
        let mut events = service.coordinator().events().subscribe();

        let job = service.create_job(new_job().activated()).await.unwrap();
        assert_eq!(job.status(), JobStatus::Active);

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.event_type(), "JobCreated");
        assert_eq!(envelope.event.job_id(), job.id());
    }

    #[tokio::test]
    async fn test_failed_transition_saves_nothing() {
        let service = service();
        let job = service.create_job(new_job()).await.unwrap();

        let err = service.pause(job.id()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidStateTransition);
        assert_eq!(service.get_job(job.id()).await.unwrap().status(), JobStatus::Draft);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let service = service();
        let err = service.activate(JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(service.get_execution_history(JobId::new(), 1, 10).await.is_err());
        assert!(!service.purge(JobId::new()).await.unwrap());
    }
}
