// src/engine/runner.rs

//! The per-run execution loop.
//!
//! Suspension points are the gate wait before each step and the backoff
//! between retriable attempts. The executor call itself runs to completion
//! (bounded by the executor's own timeouts).

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::artifacts;
use crate::catalog;
use crate::errors::Result;
use crate::events::EventName;
use crate::exec::{StepRequest, StepResult, TaskSpec};
use crate::store::{NewArtifact, NewJob, Run, RunUpdate, Step, StepUpdate};
use crate::types::{ProjectStatus, RunStatus};

use super::control::ActiveTicket;
use super::core::{decide, resume_index, AttemptDecision};
use super::orchestrator::Inner;

/// Reason recorded when a run ends because of a `cancel` action.
pub const CANCELLED_REASON: &str = "cancelled";

enum StepOutcome {
    Completed,
    Failed(String),
}

impl Inner {
    /// Background task body for one run.
    ///
    /// Store errors end the loop; the run is then marked `failed` on a best
    /// effort basis. The terminal status write also releases `ticket`, so a
    /// control action reacting to it can start a fresh loop.
    pub(crate) async fn execute_run(&self, run_id: &str, ticket: &ActiveTicket) {
        if let Err(err) = self.drive_run(run_id, ticket).await {
            error!(run_id, error = %err, "execution loop aborted");
            self.fail_run(run_id, &format!("internal error: {err}"), ticket);
        }
    }

    async fn drive_run(&self, run_id: &str, ticket: &ActiveTicket) -> Result<()> {
        let control = ticket.control();
        let Some(run) = self.store.get_run(run_id)? else {
            debug!(run_id, "run no longer exists; loop exits");
            return Ok(());
        };

        let status = if control.is_gate_open() {
            RunStatus::Running
        } else {
            RunStatus::Paused
        };
        let mut update = RunUpdate::status(status).with_ended_at(None);
        if run.started_at.is_none() {
            update = update.with_started_at(Utc::now());
        }
        let run = self.store.update_run(run_id, update)?;
        info!(run_id, %status, "run started");
        self.publish(run_id, EventName::RunStarted, json!({ "run": run }));

        let steps = self.store.list_steps(run_id)?;
        let start = resume_index(&steps);
        if start > 0 {
            info!(run_id, resume_at = start, "resuming after completed steps");
        }

        for (index, step) in steps.iter().enumerate().skip(start) {
            control.wait_for_gate().await;
            if control.is_cancelled() {
                info!(run_id, step = %step.step_key, "cancellation observed at step boundary");
                self.fail_run(run_id, CANCELLED_REASON, ticket);
                return Ok(());
            }

            // Re-assert the live status: a `retry` or `resume` may have
            // rewritten it while this loop was active.
            let status = if control.is_gate_open() {
                RunStatus::Running
            } else {
                RunStatus::Paused
            };
            self.store.update_run(
                run_id,
                RunUpdate::status(status).with_current_step_index(index),
            )?;

            match self.run_step(&run, step).await? {
                StepOutcome::Completed => {}
                StepOutcome::Failed(reason) => {
                    self.fail_run(run_id, &reason, ticket);
                    return Ok(());
                }
            }
        }

        self.complete_run(&run, steps.len(), ticket)
    }

    async fn run_step(&self, run: &Run, step: &Step) -> Result<StepOutcome> {
        let run_id = run.id.as_str();
        let max_retries = self.options.max_retries;
        let executor_enabled = catalog::find(&step.step_key).is_some_and(|d| d.executor_enabled);

        for attempt in 1..=max_retries + 1 {
            let running = self.store.update_step(&step.id, StepUpdate::running(Utc::now()))?;
            info!(run_id, step = %step.step_key, attempt, "attempt started");
            self.publish(run_id, EventName::StepUpdated, json!({ "step": running }));

            let result = self.execute_attempt(run, step, attempt, executor_enabled).await;
            self.record_attempt(run_id, step, &result).await?;

            match decide(
                result.is_success(),
                result.retriable,
                &result.summary,
                attempt,
                max_retries,
            ) {
                AttemptDecision::Complete => {
                    let done = self.store.update_step(&step.id, StepUpdate::completed(Utc::now()))?;
                    info!(run_id, step = %step.step_key, attempt, "step completed");
                    self.publish(run_id, EventName::StepUpdated, json!({ "step": done }));
                    return Ok(StepOutcome::Completed);
                }
                AttemptDecision::Retry { message } => {
                    let retrying = self.store.update_step(&step.id, StepUpdate::retrying(&message))?;
                    warn!(run_id, step = %step.step_key, attempt, %message, "attempt failed; retrying");
                    self.publish(run_id, EventName::StepUpdated, json!({ "step": retrying }));
                    tokio::time::sleep(self.options.retry_backoff).await;
                }
                AttemptDecision::Fail { reason } => {
                    let failed = self
                        .store
                        .update_step(&step.id, StepUpdate::failed(&reason, Utc::now()))?;
                    warn!(run_id, step = %step.step_key, attempt, %reason, "step failed");
                    self.publish(run_id, EventName::StepUpdated, json!({ "step": failed }));
                    return Ok(StepOutcome::Failed(reason));
                }
            }
        }

        // `decide` never retries past the last attempt.
        Ok(StepOutcome::Failed(format!(
            "step {} exhausted {} attempts",
            step.step_key,
            max_retries + 1
        )))
    }

    /// Prepare the workspace, call the executor and write the checkpoint.
    async fn execute_attempt(
        &self,
        run: &Run,
        step: &Step,
        attempt: u32,
        executor_enabled: bool,
    ) -> StepResult {
        let workspace_dir = self
            .options
            .workspace_root
            .join(&run.project_id)
            .join(&run.id)
            .join(&step.step_key);
        let task_spec =
            TaskSpec::for_step(&run.project_id, &run.id, &step.step_key, &self.constraints);

        if let Err(err) = write_task_spec(&workspace_dir, &task_spec).await {
            warn!(run_id = %run.id, step = %step.step_key, error = %err, "workspace setup failed");
            return StepResult::failed(format!("workspace error: {err:#}"), true, Vec::new());
        }

        let request = StepRequest {
            task_spec,
            step_key: step.step_key.clone(),
            executor_enabled,
            workspace_dir: workspace_dir.clone(),
            attempt,
            soft_timeout: self.options.soft_timeout,
            hard_timeout: self.options.hard_timeout,
        };
        let result = self.executor.run_step(request).await;

        let checkpoint = json!({
            "step": step.step_key,
            "attempt": attempt,
            "status": result.status,
            "summary": result.summary,
        });
        if let Err(err) = write_json(&workspace_dir.join("step_state.json"), &checkpoint).await {
            warn!(run_id = %run.id, step = %step.step_key, error = %err, "checkpoint write failed");
        }
        result
    }

    /// Persist and publish jobs, stats and artifacts of one attempt.
    async fn record_attempt(&self, run_id: &str, step: &Step, result: &StepResult) -> Result<()> {
        for log in &result.logs {
            let job = self.store.add_job(NewJob {
                run_id: run_id.to_string(),
                step_id: Some(step.id.clone()),
                title: log.title.clone(),
                content: log.content.clone(),
                status: log.status.clone(),
                worked_for: log.worked_for.clone(),
                source: log.source.clone(),
                level: log.level.clone(),
                raw: log.raw.clone(),
            })?;
            self.publish(run_id, EventName::JobLogAppended, json!({ "job": job }));
        }

        let delta = self.stats_policy.delta_for(&step.step_key, &result.metrics);
        if self.store.accumulate_stats(run_id, &delta)?.is_none() {
            debug!(run_id, "no stats row; increment skipped");
        }
        self.publish(
            run_id,
            EventName::StatsUpdated,
            json!({ "stats": self.stats_view(run_id) }),
        );

        let base = artifact_base(&self.options.workspace_root);
        for path in &result.artifacts {
            let info = match artifacts::inspect_async(path.clone(), base.clone()).await {
                Ok(info) => info,
                Err(err) => {
                    warn!(run_id, path = ?path, error = %err, "artifact skipped");
                    continue;
                }
            };
            let artifact = self.store.add_artifact(NewArtifact {
                run_id: run_id.to_string(),
                step_id: Some(step.id.clone()),
                path: info.relative_path,
                size: info.size,
                hash: info.hash,
            })?;
            debug!(run_id, path = %artifact.path, size = artifact.size, "artifact recorded");
            self.publish(run_id, EventName::ArtifactCreated, json!({ "artifact": artifact }));
        }
        Ok(())
    }

    fn complete_run(&self, run: &Run, step_count: usize, ticket: &ActiveTicket) -> Result<()> {
        let run_id = run.id.as_str();
        let update = RunUpdate::status(RunStatus::Completed)
            .with_ended_at(Some(Utc::now()))
            .with_current_step_index(step_count.saturating_sub(1));
        let run = ticket.finish(|| -> Result<Run> {
            let run = self.store.update_run(run_id, update)?;
            self.store
                .update_project_status(&run.project_id, ProjectStatus::Completed)?;
            Ok(run)
        })?;
        info!(run_id, "run completed");

        let stats = self.stats_view(run_id);
        let artifacts = self.store.list_artifacts(run_id)?;
        self.publish(
            run_id,
            EventName::RunCompleted,
            json!({ "run": run, "stats": stats, "artifacts": artifacts }),
        );
        Ok(())
    }

    /// Mark the run `failed` and publish `run_failed`. Errors are logged only.
    fn fail_run(&self, run_id: &str, reason: &str, ticket: &ActiveTicket) {
        let update = RunUpdate::status(RunStatus::Failed).with_ended_at(Some(Utc::now()));
        match ticket.finish(|| self.store.update_run(run_id, update)) {
            Ok(run) => {
                warn!(run_id, reason, "run failed");
                self.publish(
                    run_id,
                    EventName::RunFailed,
                    json!({ "run": run, "reason": reason }),
                );
            }
            Err(err) => error!(run_id, error = %err, "could not mark run failed"),
        }
    }
}

/// Artifact paths are recorded relative to the workspace root's parent.
fn artifact_base(workspace_root: &Path) -> PathBuf {
    match workspace_root.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

async fn write_task_spec(dir: &Path, spec: &TaskSpec) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    write_json(&dir.join("task_spec.json"), spec).await
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_base_for_relative_and_nested_roots() {
        assert_eq!(artifact_base(Path::new("workspace")), PathBuf::from("."));
        assert_eq!(artifact_base(Path::new("/srv/openfars/workspace")), PathBuf::from("/srv/openfars"));
    }
}
