// src/exec/process.rs

//! External executor process runner.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::backend::{LogEntry, StepExecutor, StepRequest, StepResult};
use super::mock::{MockExecutor, MOCK_SOURCE};
use super::parser::parse_result_block;
use super::policy::Policy;
use crate::exec::backend::AttemptStatus;

/// Bytes of combined stdout/stderr kept in the job log.
const MAX_RAW_OUTPUT: usize = 10_000;

/// How long to wait for output pipes to drain once the process has exited.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs `<command> run task_spec.json` inside the step workspace. The caller
/// is expected to have written `task_spec.json` there.
///
/// Steps the catalog keeps in-process, and every step when `command` cannot
/// be found on `PATH`, are delegated to the built-in [`MockExecutor`]. A
/// command rejected by [`Policy`] fails without being retried.
#[derive(Debug, Clone)]
pub struct CliExecutor {
    command: String,
    policy: Policy,
    fallback: MockExecutor,
}

impl CliExecutor {
    pub fn new(command: impl Into<String>, fallback: MockExecutor) -> Self {
        Self {
            command: command.into(),
            policy: Policy,
            fallback,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    async fn execute(&self, request: StepRequest) -> StepResult {
        if !request.executor_enabled {
            debug!(step = %request.step_key, "step not routed to external executor");
            return self.fallback.run_step(request).await;
        }

        if !self.policy.is_command_allowed(&self.command) {
            warn!(command = %self.command, "executor command rejected by safety policy");
            return StepResult::failed(
                "Executor command rejected by safety policy",
                false,
                vec![runner_log(
                    "Executor command rejected by safety policy",
                    "error",
                    "0.0s".into(),
                    self.command.clone(),
                )],
            );
        }

        if which::which(&self.command).is_err() {
            warn!(
                command = %self.command,
                step = %request.step_key,
                "executor command not found on PATH; using built-in executor"
            );
            return self.fallback.run_step(request).await;
        }

        let step_key = request.step_key.clone();
        let attempt = request.attempt;
        match self.run_process(&request).await {
            Ok(result) => result,
            Err(err) => {
                error!(step = %step_key, attempt, error = %err, "executor process error");
                StepResult::failed(
                    format!("Executor process error: {err:#}"),
                    true,
                    vec![runner_log(
                        "Codex CLI execution error",
                        "error",
                        "0.0s".into(),
                        format!("{err:#}"),
                    )],
                )
            }
        }
    }

    async fn run_process(&self, request: &StepRequest) -> Result<StepResult> {
        let workspace = &request.workspace_dir;
        tokio::fs::create_dir_all(workspace)
            .await
            .with_context(|| format!("creating workspace {:?}", workspace))?;

        // Written by the orchestrator before the attempt starts.
        let task_file = workspace.join("task_spec.json");

        info!(
            step = %request.step_key,
            attempt = request.attempt,
            command = %self.command,
            "starting executor process"
        );

        let started = Instant::now();
        let mut child = Command::new(&self.command)
            .arg("run")
            .arg(&task_file)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning executor '{}'", self.command))?;

        let stdout = child.stdout.take().map(|s| tokio::spawn(read_all(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

        let (status, timed_out) =
            wait_with_timeouts(&mut child, request.soft_timeout, request.hard_timeout).await?;

        let stdout = drain(stdout).await;
        let stderr = drain(stderr).await;
        let elapsed = started.elapsed().as_secs_f64().max(0.1);

        info!(
            step = %request.step_key,
            attempt = request.attempt,
            exit_code = status.code().unwrap_or(-1),
            timed_out,
            "executor process exited"
        );

        let raw_output = format!("{stdout}\n{stderr}").trim().to_string();
        let content = if timed_out {
            "Codex CLI execution finished (timed out)"
        } else {
            "Codex CLI execution finished"
        };
        let log = runner_log(
            content,
            if status.success() { "completed" } else { "error" },
            format!("{elapsed:.1}s"),
            truncate_utf8(&raw_output, MAX_RAW_OUTPUT).to_string(),
        );

        if !status.success() {
            return Ok(StepResult::failed(
                "Codex process exited with non-zero code",
                true,
                vec![log],
            ));
        }

        let parsed = match parse_result_block(&raw_output) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(step = %request.step_key, error = %err, "unparseable executor output");
                return Ok(StepResult::failed(err.to_string(), true, vec![log]));
            }
        };

        let artifacts = self.resolve_artifacts(request, &parsed.artifacts);
        let retriable = parsed.status != AttemptStatus::Success;
        Ok(StepResult {
            status: parsed.status,
            summary: parsed.summary,
            logs: vec![log],
            artifacts,
            metrics: parsed.metrics,
            retriable,
        })
    }

    /// Keep reported artifacts that exist and stay inside the workspace.
    fn resolve_artifacts(&self, request: &StepRequest, reported: &[String]) -> Vec<PathBuf> {
        reported
            .iter()
            .filter_map(|rel| {
                let candidate = request.workspace_dir.join(rel);
                let resolved = candidate.canonicalize().ok()?;
                if !self
                    .policy
                    .is_workspace_path_allowed(&request.workspace_dir, &resolved)
                {
                    warn!(path = %rel, "artifact outside workspace ignored");
                    return None;
                }
                Some(resolved)
            })
            .collect()
    }
}

impl StepExecutor for CliExecutor {
    fn run_step(
        &self,
        request: StepRequest,
    ) -> Pin<Box<dyn Future<Output = StepResult> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

fn runner_log(content: &str, status: &str, worked_for: String, raw: String) -> LogEntry {
    let level = if status == "error" { "error" } else { "info" };
    LogEntry {
        title: "Codex Runner".into(),
        content: content.into(),
        status: status.into(),
        worked_for,
        source: MOCK_SOURCE.into(),
        level: level.into(),
        raw,
    }
}

/// Wait for the child, escalating from graceful termination at the soft
/// timeout to a kill at the hard timeout. Returns the exit status and whether
/// the soft timeout fired.
async fn wait_with_timeouts(
    child: &mut Child,
    soft: Duration,
    hard: Duration,
) -> Result<(ExitStatus, bool)> {
    if let Ok(status) = timeout(soft, child.wait()).await {
        return Ok((status.context("waiting for executor process")?, false));
    }

    warn!(soft_timeout_secs = soft.as_secs(), "soft timeout reached; terminating executor");
    terminate(child);

    let grace = hard.saturating_sub(soft).max(Duration::from_secs(1));
    if let Ok(status) = timeout(grace, child.wait()).await {
        return Ok((status.context("waiting for terminated executor")?, true));
    }

    warn!(hard_timeout_secs = hard.as_secs(), "hard timeout reached; killing executor");
    child.kill().await.context("killing executor process")?;
    let status = child.wait().await.context("reaping killed executor")?;
    Ok((status, true))
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: `pid` is our own child and has not been reaped yet.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!(pid, "SIGTERM delivery failed; process may have exited");
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "terminate request failed; process may have exited");
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "error reading executor output");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

async fn drain(handle: Option<JoinHandle<String>>) -> String {
    let Some(mut handle) = handle else {
        return String::new();
    };
    match timeout(PIPE_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            handle.abort();
            debug!("output pipe still open after exit; abandoning reader");
            String::new()
        }
    }
}

fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
