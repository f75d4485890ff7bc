//! Routes each run to the runner registered for its job type.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{HttpRunner, JobRunner, ProcessRunner, RunOutcome, RunRequest};
use crate::config::RunnerConfig;
use crate::error::{CadenceError, ErrorCode, Result};
use crate::jobs::JobType;

/// A runner table keyed by [`JobType`].
#[derive(Clone, Default)]
pub struct DispatchRunner {
    runners: HashMap<JobType, Arc<dyn JobRunner>>,
}

impl std::fmt::Debug for DispatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<String> = self
            .runners
            .iter()
            .map(|(job_type, runner)| format!("{}={}", job_type, runner.name()))
            .collect();
        registered.sort();
        f.debug_struct("DispatchRunner").field("runners", &registered).finish()
    }
}

impl DispatchRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process runner for commands and scripts, HTTP runner for requests.
    pub fn standard(config: &RunnerConfig) -> Self {
        let process: Arc<dyn JobRunner> = Arc::new(ProcessRunner::from_config(config));
        Self::new()
            .with_runner(JobType::Command, process.clone())
            .with_runner(JobType::Script, process)
            .with_runner(JobType::HttpRequest, Arc::new(HttpRunner::from_config(config)))
    }

    /// Register (or replace) the runner for `job_type`.
    pub fn with_runner(mut self, job_type: JobType, runner: Arc<dyn JobRunner>) -> Self {
        self.runners.insert(job_type, runner);
        self
    }

    pub fn supports(&self, job_type: JobType) -> bool {
        self.runners.contains_key(&job_type)
    }
}

#[async_trait]
impl JobRunner for DispatchRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let job_type = request.configuration.job_type();
        let runner = self.runners.get(&job_type).ok_or_else(|| {
            CadenceError::with_internal(
                ErrorCode::RunnerUnavailable,
                "No runner available for this job type",
                format!("no runner registered for {} jobs", job_type),
            )
        })?;
        runner.run(request).await
    }

    fn name(&self) -> &'static str {
        "dispatch"
    }
}
