//! Local process runner for command and script jobs.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::{truncate_output, JobRunner, RunOutcome, RunRequest};
use crate::config::RunnerConfig;
use crate::error::{CadenceError, Result};
use crate::jobs::JobKind;

/// Runs the job's command line through the configured shell (or the interpreter for
/// its script) and waits for it.
///
/// The child is killed if the run is cancelled or the runner's future is dropped.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    shell: String,
    max_output_bytes: usize,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::from_config(&RunnerConfig::default())
    }
}

impl ProcessRunner {
    pub fn from_config(config: &RunnerConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    fn build_command(&self, request: &RunRequest) -> Result<Command> {
        let mut command = match request.configuration.kind() {
            JobKind::Command {
                command: program,
                args,
                working_dir,
                env,
            } => {
                // The command line goes through the shell; extra args arrive as "$@"
                let mut command = Command::new(&self.shell);
                if args.is_empty() {
                    command.arg("-c").arg(program);
                } else {
                    command
                        .arg("-c")
                        .arg(format!("{} \"$@\"", program))
                        .arg(&self.shell)
                        .args(args);
                }
                command.envs(env);
                if let Some(dir) = working_dir {
                    command.current_dir(dir);
                }
                command
            }
            JobKind::Script {
                path,
                interpreter,
                args,
            } => {
                let mut command = Command::new(interpreter.as_deref().unwrap_or(self.shell.as_str()));
                command.arg(path).args(args);
                command
            }
            other => {
                return Err(CadenceError::runner(format!(
                    "process runner cannot run {} jobs",
                    other.job_type()
                )))
            }
        };

        command
            .env("CADENCE_JOB_ID", request.job_id.to_string())
            .env("CADENCE_EXECUTION_ID", request.execution_id.to_string())
            .env("CADENCE_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !request.configuration.parameters().is_empty() {
            command.env(
                "CADENCE_PARAMETERS",
                serde_json::to_string(request.configuration.parameters())?,
            );
        }
        Ok(command)
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, request: RunRequest) -> Result<RunOutcome> {
        let child = self.build_command(&request)?.spawn().map_err(|e| {
            CadenceError::runner(format!("failed to spawn process: {}", e)).with_source(e)
        })?;

        tracing::debug!(
            job_id = %request.job_id,
            execution_id = %request.execution_id,
            pid = child.id(),
            "Spawned job process"
        );

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = request.cancel.cancelled() => {
                tracing::info!(execution_id = %request.execution_id, "Process run cancelled");
                return Ok(RunOutcome::failure("process killed after cancellation"));
            }
        };

        let stdout = truncate_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            self.max_output_bytes,
        );
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code();

        let outcome = if output.status.success() {
            RunOutcome::success(stdout)
        } else {
            let mut message = format!("process exited with {}", output.status);
            let stderr = stderr.trim();
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(&truncate_output(stderr.to_string(), self.max_output_bytes));
            }
            RunOutcome::failure(message).with_output(stdout)
        };

        Ok(match exit_code {
            Some(code) => outcome.with_metadata("exit_code", code),
            None => outcome,
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::jobs::{ExecutionId, JobConfiguration, JobId};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn request(configuration: JobConfiguration) -> RunRequest {
        RunRequest {
            job_id: JobId::new(),
            execution_id: ExecutionId::new(),
            attempt: 0,
            configuration,
            cancel: CancellationToken::new(),
        }
    }

    fn command(program: &str, args: &[&str]) -> JobConfiguration {
        JobConfiguration::new(JobKind::Command {
            command: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            working_dir: None,
            env: Default::default(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let outcome = ProcessRunner::default()
            .run(request(command("echo", &["hello"])))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.output.as_deref(), Some("hello\n"));
        assert_eq!(outcome.metadata["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_failed_outcome() {
        let outcome = ProcessRunner::default()
            .run(request(command("sh", &["-c", "echo oops >&2; exit 3"])))
            .await
            .unwrap();
        let error = outcome.error.unwrap();
        assert!(error.contains("oops"));
        assert_eq!(outcome.metadata["exit_code"], 3);
    }

    #[tokio::test]
    async fn test_exposes_execution_context_to_process() {
        let req = request(command("sh", &["-c", "printf %s \"$CADENCE_EXECUTION_ID\""]));
        let expected = req.execution_id.to_string();
        let outcome = ProcessRunner::default().run(req).await.unwrap();
        assert_eq!(outcome.output.as_deref(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_output_truncated_to_budget() {
        let outcome = ProcessRunner::default()
            .with_max_output_bytes(4)
            .run(request(command("echo", &["abcdefgh"])))
            .await
            .unwrap();
        assert_eq!(outcome.output.unwrap(), format!("abcd{}", super::super::TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn test_cancellation_stops_process() {
        let req = request(command("sleep", &["30"]));
        let token = req.cancel.clone();
        let runner = ProcessRunner::default();
        let handle = tokio::spawn(async move { runner.run(req).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_command_line_with_arguments_runs_in_shell() {
        let config = JobConfiguration::command("echo hello").unwrap();
        let outcome = ProcessRunner::default().run(request(config)).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.output.as_deref().unwrap_or_default().contains("hello"));

        let config = JobConfiguration::command("printf '%s-%s' a b | tr a-z A-Z").unwrap();
        let outcome = ProcessRunner::default().run(request(config)).await.unwrap();
        assert_eq!(outcome.output.as_deref(), Some("A-B"));
    }

    #[tokio::test]
    async fn test_missing_program_is_a_failed_outcome() {
        let outcome = ProcessRunner::default()
            .run(request(command("/definitely/not/a/program", &[])))
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.metadata["exit_code"], 127);
    }

    #[tokio::test]
    async fn test_missing_shell_is_runner_error() {
        let config = RunnerConfig {
            shell: "/definitely/not/a/shell".to_string(),
            ..RunnerConfig::default()
        };
        let err = ProcessRunner::from_config(&config)
            .run(request(command("true", &[])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::RunnerError);
    }

    #[tokio::test]
    async fn test_rejects_other_kinds() {
        let config = JobConfiguration::http_request("https://example.com", "GET").unwrap();
        assert!(ProcessRunner::default().run(request(config)).await.is_err());
    }
}
