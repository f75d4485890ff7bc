//! In-memory job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::cmp::Reverse;

use super::{JobFilter, JobStore};
use crate::error::Result;
use crate::jobs::{ExecutionId, Job, JobExecution, JobId, JobStatus};
use crate::pagination::OffsetPagination;

/// Job store backed by concurrent hash maps. Records are cloned in and out.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
    executions: DashMap<ExecutionId, JobExecution>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn execution_count(&self) -> usize {
        self.executions.len()
    }

    /// All executions of a job, newest first.
    fn executions_of(&self, job_id: JobId) -> Vec<JobExecution> {
        let mut executions: Vec<JobExecution> = self
            .executions
            .iter()
            .filter(|entry| entry.job_id() == job_id)
            .map(|entry| entry.value().clone())
            .collect();
        executions.sort_by_key(|e| (Reverse(e.started_at()), Reverse(e.created_at()), e.id()));
        executions
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn fetch_due_jobs(&self, as_of: DateTime<Utc>, limit: usize) -> Result<Vec<Job>> {
        let mut due: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.status() == JobStatus::Active && entry.is_due(as_of))
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by_key(|job| (job.next_run_at(), job.id()));
        due.truncate(limit);
        Ok(due)
    }

    async fn fetch_job(&self, job_id: JobId) -> Result<Option<Job>> {
        Ok(self.jobs.get(&job_id).map(|entry| entry.value().clone()))
    }

    async fn save_job(&self, job: &Job) -> Result<()> {
        self.jobs.insert(job.id(), job.clone());
        counter!("cadence_store_writes_total", "backend" => "in_memory", "record" => "job").increment(1);
        Ok(())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|job| (job.created_at(), job.id()));
        Ok(jobs)
    }

    async fn purge_job(&self, job_id: JobId) -> Result<bool> {
        let existed = self.jobs.remove(&job_id).is_some();
        self.executions.retain(|_, execution| execution.job_id() != job_id);
        Ok(existed)
    }

    async fn fetch_running_execution(&self, job_id: JobId) -> Result<Option<JobExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| entry.job_id() == job_id && entry.is_in_flight())
            .map(|entry| entry.value().clone())
            .min_by_key(|execution| execution.created_at()))
    }

    async fn fetch_execution(&self, execution_id: ExecutionId) -> Result<Option<JobExecution>> {
        Ok(self.executions.get(&execution_id).map(|entry| entry.value().clone()))
    }

    async fn save_execution(&self, execution: &JobExecution) -> Result<()> {
        self.executions.insert(execution.id(), execution.clone());
        counter!("cadence_store_writes_total", "backend" => "in_memory", "record" => "execution").increment(1);
        Ok(())
    }

    async fn list_executions(
        &self,
        job_id: JobId,
        pagination: &OffsetPagination,
    ) -> Result<(Vec<JobExecution>, u64)> {
        let executions = self.executions_of(job_id);
        let total = executions.len() as u64;
        Ok((pagination.paginate_iter(executions.into_iter()), total))
    }

    async fn executions_since(&self, job_id: JobId, since: DateTime<Utc>) -> Result<Vec<JobExecution>> {
        let mut executions = self.executions_of(job_id);
        executions.retain(|e| e.started_at() >= since);
        Ok(executions)
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ExecutionOrigin, JobConfiguration, UserId};
    use crate::schedule::CronExpression;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn job(name: &str) -> Job {
        Job::new(
            name,
            CronExpression::every_minute(),
            JobConfiguration::command("true").unwrap(),
            UserId::new(),
            t0(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_due_jobs_only_active_and_due() {
        let store = InMemoryJobStore::new();
        let mut active = job("active");
        active.activate(t0()).unwrap();
        let draft = job("draft");
        let mut paused = job("paused");
        paused.activate(t0()).unwrap();
        paused.pause(t0()).unwrap();
        for j in [&active, &draft, &paused] {
            store.save_job(j).await.unwrap();
        }

        assert!(store.fetch_due_jobs(t0(), 10).await.unwrap().is_empty());
        let due = store.fetch_due_jobs(t0() + Duration::minutes(1), 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id(), active.id());
        assert!(store.fetch_due_jobs(t0() + Duration::minutes(1), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_jobs_excludes_deleted() {
        let store = InMemoryJobStore::new();
        let keep = job("Billing export").with_tags(["finance"]);
        let mut gone = job("billing cleanup");
        gone.delete(t0()).unwrap();
        store.save_job(&keep).await.unwrap();
        store.save_job(&gone).await.unwrap();

        let found = store
            .list_jobs(&JobFilter::new().with_search("BILLING"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id(), keep.id());
        assert_eq!(store.list_jobs(&JobFilter::new().with_tag("FINANCE")).await.unwrap().len(), 1);
        assert!(store.fetch_job(gone.id()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_executions_newest_first_and_paginated() {
        let store = InMemoryJobStore::new();
        let job = job("history");
        for i in 0..5 {
            let exec = JobExecution::pending(job.id(), ExecutionOrigin::Scheduled, None, t0() + Duration::minutes(i));
            store.save_execution(&exec).await.unwrap();
        }

        let (page, total) = store
            .list_executions(job.id(), &OffsetPagination::new(1, 2))
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page[0].started_at(), t0() + Duration::minutes(4));
        assert_eq!(page[1].started_at(), t0() + Duration::minutes(3));

        let recent = store
            .executions_since(job.id(), t0() + Duration::minutes(3))
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn test_running_execution_and_purge() {
        let store = InMemoryJobStore::new();
        let job = job("purge me");
        store.save_job(&job).await.unwrap();

        let mut done = JobExecution::pending(job.id(), ExecutionOrigin::Manual, None, t0());
        done.skip("not needed", t0()).unwrap();
        let running = JobExecution::pending(job.id(), ExecutionOrigin::Scheduled, None, t0());
        store.save_execution(&done).await.unwrap();
        store.save_execution(&running).await.unwrap();

        let found = store.fetch_running_execution(job.id()).await.unwrap().unwrap();
        assert_eq!(found.id(), running.id());

        assert!(store.purge_job(job.id()).await.unwrap());
        assert_eq!(store.execution_count(), 0);
        assert!(!store.purge_job(job.id()).await.unwrap());
    }
}
