//! In-flight execution tracking: deadlines and cancellation tokens.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::jobs::{ExecutionId, JobId};

/// One dispatched execution the coordinator is watching.
#[derive(Debug, Clone)]
pub(crate) struct RunningExecution {
    pub job_id: JobId,
    /// Unset until the execution starts, or when it has no timeout
    pub deadline: Option<DateTime<Utc>>,
    pub cancel: CancellationToken,
}

/// Dispatched executions by id.
#[derive(Debug, Default)]
pub(crate) struct RunningRegistry {
    entries: DashMap<ExecutionId, RunningExecution>,
}

impl RunningRegistry {
    /// Track an execution; returns the token its runner should watch.
    pub fn register(&self, execution_id: ExecutionId, job_id: JobId) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.entries.insert(
            execution_id,
            RunningExecution {
                job_id,
                deadline: None,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    pub fn set_deadline(&self, execution_id: ExecutionId, deadline: Option<DateTime<Utc>>) {
        if let Some(mut entry) = self.entries.get_mut(&execution_id) {
            entry.deadline = deadline;
        }
    }

    pub fn remove(&self, execution_id: ExecutionId) -> Option<RunningExecution> {
        self.entries.remove(&execution_id).map(|(_, entry)| entry)
    }

    /// Stop tracking every execution of `job_id`, handing back their entries.
    pub fn remove_job(&self, job_id: JobId) -> Vec<RunningExecution> {
        let ids: Vec<ExecutionId> = self
            .entries
            .iter()
            .filter(|entry| entry.job_id == job_id)
            .map(|entry| *entry.key())
            .collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Executions whose deadline lies strictly before `now`.
    pub fn overdue(&self, now: DateTime<Utc>) -> Vec<(ExecutionId, JobId)> {
        self.entries
            .iter()
            .filter(|entry| entry.deadline.is_some_and(|deadline| deadline < now))
            .map(|entry| (*entry.key(), entry.job_id))
            .collect()
    }

    pub fn contains(&self, execution_id: ExecutionId) -> bool {
        self.entries.contains_key(&execution_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_overdue_only_after_deadline() {
        let registry = RunningRegistry::default();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let (late, on_time, unbounded) = (ExecutionId::new(), ExecutionId::new(), ExecutionId::new());
        let job = JobId::new();

        registry.register(late, job);
        registry.register(on_time, job);
        registry.register(unbounded, job);
        registry.set_deadline(late, Some(now - Duration::seconds(1)));
        registry.set_deadline(on_time, Some(now));

        assert_eq!(registry.overdue(now), vec![(late, job)]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_remove_hands_back_token() {
        let registry = RunningRegistry::default();
        let id = ExecutionId::new();
        let token = registry.register(id, JobId::new());
        let entry = registry.remove(id).unwrap();
        entry.cancel.cancel();
        assert!(token.is_cancelled());
        assert!(!registry.contains(id));
        assert!(registry.remove(id).is_none());
    }

    #[test]
    fn test_remove_job_only_touches_that_job() {
        let registry = RunningRegistry::default();
        let (job, other) = (JobId::new(), JobId::new());
        registry.register(ExecutionId::new(), job);
        registry.register(ExecutionId::new(), job);
        let kept = ExecutionId::new();
        registry.register(kept, other);

        assert_eq!(registry.remove_job(job).len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(kept));
    }
}
