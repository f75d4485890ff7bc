//! Runners: the collaborators that actually do a job's work.
//!
//! A runner receives a [`RunRequest`] and reports a [`RunOutcome`]. The outcome is a
//! normal result either way: a job whose work fails returns `Ok` with an error set.
//! `Err` is reserved for the runner itself being unable to run the job at all.
//!
//! Runners must watch [`RunRequest::cancel`] and stop work when it fires. The
//! execution record has already been moved to Cancelled or Timeout by then, so
//! whatever outcome they return afterwards is ignored.

mod dispatch;
mod http;
mod process;

pub use dispatch::DispatchRunner;
pub use http::HttpRunner;
pub use process::ProcessRunner;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::jobs::{ExecutionId, JobConfiguration, JobId, Metadata};

/// Marker appended to output cut at the byte budget.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]";

// ═══════════════════════════════════════════════════════════════════════════════
// Request / Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a runner gets to know about one attempt.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub job_id: JobId,
    pub execution_id: ExecutionId,
    /// 0 for the first attempt, then the retry count
    pub attempt: u32,
    pub configuration: JobConfiguration,
    /// Fires when the execution is cancelled or times out
    pub cancel: CancellationToken,
}

/// What the work produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    pub output: Option<String>,
    /// Set when the job's work failed
    pub error: Option<String>,
    pub metadata: Metadata,
}

impl RunOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for job runners.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one attempt to completion (or until cancelled).
    async fn run(&self, request: RunRequest) -> Result<RunOutcome>;

    /// Get the runner name.
    fn name(&self) -> &'static str;
}

/// Cut `text` to at most `max_bytes` on a char boundary, marking the cut.
pub(crate) fn truncate_output(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = max_bytes;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_output_respects_char_boundaries() {
        assert_eq!(truncate_output("short".to_string(), 10), "short");
        let truncated = truncate_output("héllo".to_string(), 2);
        assert_eq!(truncated, format!("h{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_outcome_builders() {
        let ok = RunOutcome::success("done").with_metadata("rows", 3);
        assert!(ok.is_success());
        assert_eq!(ok.metadata["rows"], 3);

        let failed = RunOutcome::failure("exit 2").with_output("partial");
        assert!(!failed.is_success());
        assert_eq!(failed.output.as_deref(), Some("partial"));
    }
}
