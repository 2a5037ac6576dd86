// src/exec/backend.rs

//! Pluggable step executor abstraction.
//!
//! The orchestrator talks to a [`StepExecutor`] instead of spawning processes
//! itself. Production wiring picks [`MockExecutor`](super::MockExecutor) or
//! [`CliExecutor`](super::CliExecutor) from config; tests provide scripted
//! implementations that never touch a process.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::task_spec::TaskSpec;

/// Outcome reported by an executor for a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// Human-readable log entry emitted during an attempt. Persisted as a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub title: String,
    pub content: String,
    pub status: String,
    pub worked_for: String,
    pub source: String,
    pub level: String,
    pub raw: String,
}

/// Metrics reported for one attempt; absent keys default to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepMetrics {
    pub tokens: u64,
    pub cost_usd: f64,
    pub token_cost_usd: f64,
    pub gpu_hours: f64,
}

/// Normalized result of one attempt.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub status: AttemptStatus,
    pub summary: String,
    /// In the order they should be persisted and published.
    pub logs: Vec<LogEntry>,
    /// Absolute paths of files produced by the attempt.
    pub artifacts: Vec<PathBuf>,
    pub metrics: StepMetrics,
    pub retriable: bool,
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Success
    }

    /// Failed result used wherever an executor has to fail closed.
    pub fn failed(summary: impl Into<String>, retriable: bool, logs: Vec<LogEntry>) -> Self {
        Self {
            status: AttemptStatus::Failed,
            summary: summary.into(),
            logs,
            artifacts: Vec::new(),
            metrics: StepMetrics::default(),
            retriable,
        }
    }
}

/// Everything an executor needs for one attempt.
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub task_spec: TaskSpec,
    pub step_key: String,
    /// Whether the catalog routes this step to the external executor.
    pub executor_enabled: bool,
    pub workspace_dir: PathBuf,
    pub attempt: u32,
    /// After this, graceful termination of the external process is attempted.
    pub soft_timeout: Duration,
    /// After this, the external process is killed.
    pub hard_timeout: Duration,
}

/// Trait abstracting how a step attempt is executed.
///
/// Implementations must fail closed: any error is reported as a `failed`
/// [`StepResult`], never returned or panicked into the execution loop.
pub trait StepExecutor: Send + Sync {
    fn run_step(&self, request: StepRequest)
    -> Pin<Box<dyn Future<Output = StepResult> + Send + '_>>;
}
