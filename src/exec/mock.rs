// src/exec/mock.rs

//! Deterministic built-in executor.
//!
//! Used by default (`mode = "mock"`), for catalog steps that do not invoke the
//! external executor, and as the fallback when the configured command is not
//! on `PATH`. It fails the first attempt of `code_and_execute` retriably so
//! the retry path is exercised end to end.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, warn};

use super::backend::{LogEntry, StepExecutor, StepMetrics, StepRequest, StepResult};
use super::parser::parse_result_block;

pub const MOCK_SOURCE: &str = "codex-cli";

/// Step whose first attempt fails transiently.
pub const TRANSIENT_FAILURE_STEP: &str = "code_and_execute";

/// Step that writes the final report artifacts.
pub const PACKAGING_STEP: &str = "final_packaging";

const CANNED_RESULT: &str = r#"
<openfars_result>
{
  "status": "success",
  "summary": "step completed",
  "artifacts": [],
  "metrics": {"tokens": 180000, "cost_usd": 1.2, "token_cost_usd": 1.2, "gpu_hours": 0.05},
  "next_inputs": {}
}
</openfars_result>
"#;

#[derive(Debug, Clone)]
pub struct MockExecutor {
    delay: Duration,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

impl MockExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn execute(&self, request: StepRequest) -> StepResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let raw_spec = serde_json::to_string(&request.task_spec).unwrap_or_default();
        let mut logs = vec![LogEntry {
            title: "Codex Runner".into(),
            content: format!(
                "Executing {} (attempt {})",
                request.step_key, request.attempt
            ),
            status: "running".into(),
            worked_for: "<1s".into(),
            source: MOCK_SOURCE.into(),
            level: "info".into(),
            raw: raw_spec,
        }];

        if request.step_key == TRANSIENT_FAILURE_STEP && request.attempt == 1 {
            logs.push(LogEntry {
                title: "Codex Runner".into(),
                content: "Transient execution failure detected; eligible for auto-retry.".into(),
                status: "error".into(),
                worked_for: "<1s".into(),
                source: MOCK_SOURCE.into(),
                level: "warning".into(),
                raw: "mock transient failure".into(),
            });
            let mut result = StepResult::failed("Mock transient failure", true, logs);
            result.metrics = StepMetrics {
                tokens: 120_000,
                cost_usd: 0.84,
                token_cost_usd: 0.84,
                gpu_hours: 0.02,
            };
            return result;
        }

        let artifacts = if request.step_key == PACKAGING_STEP {
            match write_final_package(&request.workspace_dir, &request.task_spec.goal).await {
                Ok(paths) => paths,
                Err(err) => {
                    warn!(step = %request.step_key, error = %err, "mock packaging failed");
                    return StepResult::failed(format!("packaging failed: {err:#}"), true, logs);
                }
            }
        } else {
            Vec::new()
        };

        match parse_result_block(CANNED_RESULT) {
            Ok(parsed) => {
                debug!(step = %request.step_key, attempt = request.attempt, "mock step succeeded");
                StepResult {
                    status: parsed.status,
                    summary: parsed.summary,
                    logs,
                    artifacts,
                    metrics: parsed.metrics,
                    retriable: false,
                }
            }
            Err(err) => StepResult::failed(err.to_string(), true, logs),
        }
    }
}

impl StepExecutor for MockExecutor {
    fn run_step(
        &self,
        request: StepRequest,
    ) -> Pin<Box<dyn Future<Output = StepResult> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}

async fn write_final_package(workspace_dir: &Path, goal: &str) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(workspace_dir)
        .await
        .with_context(|| format!("creating workspace {:?}", workspace_dir))?;

    let report_path = workspace_dir.join("report.json");
    let report = json!({
        "title": goal,
        "summary": "OpenFARS run finished in mock mode.",
        "status": "success",
    });
    tokio::fs::write(&report_path, serde_json::to_vec_pretty(&report)?)
        .await
        .with_context(|| format!("writing {:?}", report_path))?;

    let tex_path = workspace_dir.join("paper_draft.tex");
    tokio::fs::write(
        &tex_path,
        "\\documentclass{article}\\begin{document}OpenFARS Draft\\end{document}\n",
    )
    .await
    .with_context(|| format!("writing {:?}", tex_path))?;

    Ok(vec![report_path, tex_path])
}
