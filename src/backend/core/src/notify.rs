//! Outcome notifications.
//!
//! The coordinator calls a [`Notifier`] after a terminal transition when the job's
//! [`NotificationPolicy`](crate::jobs::NotificationPolicy) asks for that outcome.
//! Delivery runs off the execution path; a failing notifier is logged and ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::jobs::{ExecutionStatus, Job, JobExecution};

/// Which kind of outcome a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Failure,
}

impl NotificationKind {
    /// The kind for a terminal status, if that status is ever notified.
    pub fn for_status(status: ExecutionStatus) -> Option<Self> {
        match status {
            ExecutionStatus::Completed => Some(Self::Success),
            ExecutionStatus::Failed | ExecutionStatus::Timeout => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tell the job's notification address about `execution`.
    async fn notify(&self, job: &Job, execution: &JobExecution) -> Result<()>;

    /// Get the notifier name.
    fn name(&self) -> &'static str;
}

/// Records notification intent in the log. The address is always redacted.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, job: &Job, execution: &JobExecution) -> Result<()> {
        let Some(email) = job.configuration().notify_email() else {
            return Ok(());
        };
        let kind = NotificationKind::for_status(execution.status()).map_or("other", |k| k.as_str());

        tracing::info!(
            job_id = %job.id(),
            job_name = %job.name(),
            execution_id = %execution.id(),
            status = %execution.status(),
            kind,
            recipient = %email.redacted(),
            summary = %execution.status_description(),
            "Job notification"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ExecutionOrigin, JobConfiguration, UserId};
    use crate::schedule::CronExpression;
    use chrono::Utc;

    #[test]
    fn test_kind_for_status() {
        assert_eq!(NotificationKind::for_status(ExecutionStatus::Completed), Some(NotificationKind::Success));
        assert_eq!(NotificationKind::for_status(ExecutionStatus::Timeout), Some(NotificationKind::Failure));
        assert_eq!(NotificationKind::for_status(ExecutionStatus::Skipped), None);
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let now = Utc::now();
        let config = JobConfiguration::command("true")
            .unwrap()
            .with_notification("ops@example.com")
            .unwrap();
        let job = Job::new("backup", CronExpression::daily(), config, UserId::new(), now).unwrap();
        let mut execution = JobExecution::pending(job.id(), ExecutionOrigin::Scheduled, None, now);
        execution.start(now).unwrap();
        execution.fail("disk full", None, None, now).unwrap();

        assert!(LogNotifier.notify(&job, &execution).await.is_ok());
    }
}
