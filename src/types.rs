use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::OrchestratorError;

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    InProgress,
    Completed,
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// `completed` and `failed` end the execution loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single step inside a run.
///
/// `Error` is used both for a retriable attempt that will be retried and for
/// the terminal failure of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally issued control command for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Pause,
    Resume,
    Cancel,
    Retry,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Cancel => "cancel",
            ControlAction::Retry => "retry",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlAction {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pause" => Ok(ControlAction::Pause),
            "resume" => Ok(ControlAction::Resume),
            "cancel" => Ok(ControlAction::Cancel),
            "retry" => Ok(ControlAction::Retry),
            _ => Err(OrchestratorError::UnknownAction(s.to_string())),
        }
    }
}

/// Which step executor backs the orchestrator.
///
/// - `Mock`: deterministic built-in executor (default, no external process).
/// - `Cli`: spawn the configured command for every executor-enabled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorMode {
    #[default]
    Mock,
    Cli,
}

impl FromStr for ExecutorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(ExecutorMode::Mock),
            "cli" | "real" => Ok(ExecutorMode::Cli),
            other => Err(format!(
                "invalid executor mode: {other} (expected \"mock\" or \"cli\")"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_action_parses_case_insensitively() {
        assert_eq!("Pause".parse::<ControlAction>().unwrap(), ControlAction::Pause);
        assert_eq!(" retry ".parse::<ControlAction>().unwrap(), ControlAction::Retry);
    }

    #[test]
    fn unknown_control_action_is_domain_error() {
        let err = "bogus".parse::<ControlAction>().unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownAction(ref a) if a == "bogus"));
        assert!(err.is_domain_error());
    }

    #[test]
    fn statuses_serialize_like_the_wire_format() {
        assert_eq!(serde_json::to_string(&ProjectStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!(serde_json::to_string(&RunStatus::Paused).unwrap(), "\"paused\"");
        assert_eq!(serde_json::to_string(&StepStatus::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn executor_mode_accepts_legacy_real_alias() {
        assert_eq!("real".parse::<ExecutorMode>().unwrap(), ExecutorMode::Cli);
        assert!("docker".parse::<ExecutorMode>().is_err());
    }
}
