// src/events/mod.rs

//! Per-run event fan-out.
//!
//! The orchestrator publishes one [`EventMessage`] after every state-changing
//! action. Subscribers are bounded `mpsc` channels registered per run; the
//! [`bus`] module owns delivery.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

pub mod bus;

pub use bus::{EventBus, SubscriberId, Subscription};

/// Names of the events emitted for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    RunStarted,
    StepUpdated,
    JobLogAppended,
    StatsUpdated,
    ArtifactCreated,
    RunFailed,
    RunCompleted,
    /// Initial state pushed to a subscriber that attaches mid-run.
    Snapshot,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::RunStarted => "run_started",
            EventName::StepUpdated => "step_updated",
            EventName::JobLogAppended => "job_log_appended",
            EventName::StatsUpdated => "stats_updated",
            EventName::ArtifactCreated => "artifact_created",
            EventName::RunFailed => "run_failed",
            EventName::RunCompleted => "run_completed",
            EventName::Snapshot => "snapshot",
        }
    }

    /// `run_failed` and `run_completed` end a loop activation.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventName::RunFailed | EventName::RunCompleted)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct EventMessage {
    pub event: EventName,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    pub fn new(event: EventName, payload: Value) -> Self {
        Self {
            event,
            payload,
            timestamp: Utc::now(),
        }
    }
}
