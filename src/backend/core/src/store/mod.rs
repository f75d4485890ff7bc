//! Persistence of jobs and their executions.
//!
//! [`JobStore`] is the seam between the engine and whatever holds the records. Each
//! `save_*` is an atomic single-record upsert; the engine serializes writes per job on
//! its side, so a backend only has to guarantee that individual upserts don't tear.
//!
//! [`InMemoryJobStore`] backs the server binary and the tests.

mod memory;

pub use memory::InMemoryJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::{CategoryId, ExecutionId, Job, JobExecution, JobId, JobStatus, TeamId, UserId};
use crate::pagination::OffsetPagination;

// ═══════════════════════════════════════════════════════════════════════════════
// Job Filter
// ═══════════════════════════════════════════════════════════════════════════════

/// Criteria for [`JobStore::list_jobs`]. Deleted jobs never match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFilter {
    pub owner: Option<UserId>,
    pub team: Option<TeamId>,
    pub category: Option<CategoryId>,
    pub status: Option<JobStatus>,
    /// Case-insensitive tag match
    pub tag: Option<String>,
    /// Case-insensitive substring of name or description
    pub search: Option<String>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
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

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Whether `job` satisfies every set criterion.
    pub fn matches(&self, job: &Job) -> bool {
        if job.is_deleted() {
            return false;
        }
        if self.owner.is_some_and(|owner| job.owner() != owner) {
            return false;
        }
        if self.team.is_some() && job.team() != self.team {
            return false;
        }
        if self.category.is_some() && job.category() != self.category {
            return false;
        }
        if self.status.is_some_and(|status| job.status() != status) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !job.has_tag(tag) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.trim().to_lowercase();
            let in_name = job.name().to_lowercase().contains(&needle);
            let in_description = job
                .description()
                .is_some_and(|d| d.to_lowercase().contains(&needle));
            if !in_name && !in_description {
                return false;
            }
        }
        true
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Job Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for job persistence backends.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Active jobs with `next_run_at <= as_of`, earliest first, at most `limit`.
    async fn fetch_due_jobs(&self, as_of: DateTime<Utc>, limit: usize) -> Result<Vec<Job>>;

    /// Get a job by id (Deleted jobs included).
    async fn fetch_job(&self, job_id: JobId) -> Result<Option<Job>>;

    /// Insert or replace a job.
    async fn save_job(&self, job: &Job) -> Result<()>;

    /// Non-deleted jobs matching `filter`, oldest first.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;

    /// Remove a job and all its executions. Returns whether the job existed.
    async fn purge_job(&self, job_id: JobId) -> Result<bool>;

    /// The job's in-flight (Pending or Running) execution, if any.
    async fn fetch_running_execution(&self, job_id: JobId) -> Result<Option<JobExecution>>;

    /// Get an execution by id.
    async fn fetch_execution(&self, execution_id: ExecutionId) -> Result<Option<JobExecution>>;

    /// Insert or replace an execution.
    async fn save_execution(&self, execution: &JobExecution) -> Result<()>;

    /// One page of a job's executions, newest first, with the total count.
    async fn list_executions(
        &self,
        job_id: JobId,
        pagination: &OffsetPagination,
    ) -> Result<(Vec<JobExecution>, u64)>;

    /// A job's executions started at or after `since`, newest first.
    async fn executions_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<Vec<JobExecution>>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}
