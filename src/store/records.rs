// src/store/records.rs

//! Persisted row types plus the write-side inputs used to create or patch them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProjectStatus, RunStatus, StepStatus};

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub project_id: String,
    pub status: RunStatus,
    /// Index (0-based) of the step being attempted, or the last one processed.
    pub current_step_index: usize,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub run_id: String,
    pub step_key: String,
    pub number: u32,
    pub title: String,
    pub status: StepStatus,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub error_message: Option<String>,
    pub updated_at: Timestamp,
}

/// Append-only log entry produced during a step attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub run_id: String,
    pub step_id: Option<String>,
    /// Local wall-clock time (`HH:MM`) for display.
    pub time: String,
    pub title: String,
    pub content: String,
    pub status: String,
    pub worked_for: String,
    pub source: String,
    pub level: String,
    pub raw: String,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub run_id: String,
    pub step_id: Option<String>,
    /// Path relative to the parent of the workspace root.
    pub path: String,
    pub size: u64,
    /// SHA-256 hex digest of the file contents.
    pub hash: String,
    pub created_at: Timestamp,
}

/// Accumulated per-run counters. Only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub run_id: String,
    pub hypothesis: u64,
    pub papers: u64,
    pub tokens: u64,
    pub cost_usd: f64,
    pub elapsed_seconds: u64,
    pub token_cost_usd: f64,
    pub gpu_hours: f64,
    pub updated_at: Timestamp,
}

impl Stats {
    pub fn zeroed(run_id: impl Into<String>, at: Timestamp) -> Self {
        Self {
            run_id: run_id.into(),
            hypothesis: 0,
            papers: 0,
            tokens: 0,
            cost_usd: 0.0,
            elapsed_seconds: 0,
            token_cost_usd: 0.0,
            gpu_hours: 0.0,
            updated_at: at,
        }
    }

    /// Add a delta. Negative or NaN float increments are ignored so the
    /// counters never decrease.
    pub fn apply(&mut self, delta: &StatsDelta, at: Timestamp) {
        self.hypothesis = self.hypothesis.saturating_add(delta.hypothesis);
        self.papers = self.papers.saturating_add(delta.papers);
        self.tokens = self.tokens.saturating_add(delta.tokens);
        self.elapsed_seconds = self.elapsed_seconds.saturating_add(delta.elapsed_seconds);
        self.cost_usd += non_negative(delta.cost_usd);
        self.token_cost_usd += non_negative(delta.token_cost_usd);
        self.gpu_hours += non_negative(delta.gpu_hours);
        self.updated_at = at;
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

/// Increment applied to [`Stats`] after one step attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsDelta {
    pub hypothesis: u64,
    pub papers: u64,
    pub tokens: u64,
    pub cost_usd: f64,
    pub elapsed_seconds: u64,
    pub token_cost_usd: f64,
    pub gpu_hours: f64,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub run_id: String,
    pub step_id: Option<String>,
    pub title: String,
    pub content: String,
    pub status: String,
    pub worked_for: String,
    pub source: String,
    pub level: String,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: String,
    pub step_id: Option<String>,
    pub path: String,
    pub size: u64,
    pub hash: String,
}

/// Partial update of a run. `None` leaves a field untouched; for the
/// nullable timestamps `Some(None)` clears the field.
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub current_step_index: Option<usize>,
    pub started_at: Option<Option<Timestamp>>,
    pub ended_at: Option<Option<Timestamp>>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn current_step_index(index: usize) -> Self {
        Self {
            current_step_index: Some(index),
            ..Self::default()
        }
    }

    pub fn with_current_step_index(mut self, index: usize) -> Self {
        self.current_step_index = Some(index);
        self
    }

    pub fn with_started_at(mut self, at: Timestamp) -> Self {
        self.started_at = Some(Some(at));
        self
    }

    pub fn with_ended_at(mut self, at: Option<Timestamp>) -> Self {
        self.ended_at = Some(at);
        self
    }
}

/// Partial update of a step, same conventions as [`RunUpdate`].
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub status: Option<StepStatus>,
    pub started_at: Option<Option<Timestamp>>,
    pub ended_at: Option<Option<Timestamp>>,
    pub error_message: Option<Option<String>>,
}

impl StepUpdate {
    /// Attempt started: stamp start time, clear end time and prior error.
    pub fn running(at: Timestamp) -> Self {
        Self {
            status: Some(StepStatus::Running),
            started_at: Some(Some(at)),
            ended_at: Some(None),
            error_message: Some(None),
        }
    }

    pub fn completed(at: Timestamp) -> Self {
        Self {
            status: Some(StepStatus::Completed),
            ended_at: Some(Some(at)),
            error_message: Some(None),
            ..Self::default()
        }
    }

    /// Retriable failure; the step stays open for the next attempt.
    pub fn retrying(message: impl Into<String>) -> Self {
        Self {
            status: Some(StepStatus::Error),
            error_message: Some(Some(message.into())),
            ..Self::default()
        }
    }

    /// Terminal failure of the step.
    pub fn failed(message: impl Into<String>, at: Timestamp) -> Self {
        Self {
            status: Some(StepStatus::Error),
            ended_at: Some(Some(at)),
            error_message: Some(Some(message.into())),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_apply_ignores_negative_and_nan_floats() {
        let now = Utc::now();
        let mut stats = Stats::zeroed("run_x", now);
        stats.apply(
            &StatsDelta {
                tokens: 10,
                cost_usd: 1.5,
                ..StatsDelta::default()
            },
            now,
        );
        stats.apply(
            &StatsDelta {
                cost_usd: -3.0,
                gpu_hours: f64::NAN,
                ..StatsDelta::default()
            },
            now,
        );
        assert_eq!(stats.tokens, 10);
        assert_eq!(stats.cost_usd, 1.5);
        assert_eq!(stats.gpu_hours, 0.0);
    }

    #[test]
    fn records_serialize_camel_case() {
        let now = Utc::now();
        let json = serde_json::to_value(Stats::zeroed("run_x", now)).unwrap();
        assert!(json.get("runId").is_some());
        assert!(json.get("tokenCostUsd").is_some());
        assert!(json.get("elapsedSeconds").is_some());
    }
}
