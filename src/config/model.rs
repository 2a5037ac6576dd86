// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ExecutorMode;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [orchestrator]
/// max_retries = 2
/// retry_backoff_ms = 400
/// workspace_root = "workspace"
///
/// [executor]
/// mode = "cli"
/// command = "codex"
///
/// [constraints]
/// budget_usd = 50.0
///
/// [stats.increments.topic_scoping]
/// hypothesis = 30
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub constraints: ConstraintsSection,

    #[serde(default)]
    pub stats: StatsSection,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` outside this module.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub executor: ExecutorSection,
    pub constraints: ConstraintsSection,
    pub stats: StatsSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            orchestrator: raw.orchestrator,
            executor: raw.executor,
            constraints: raw.constraints,
            stats: raw.stats,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Extra attempts after the first one for retriable failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retriable attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Root directory for per-step workspaces.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    400
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("workspace")
}

impl OrchestratorSection {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            workspace_root: default_workspace_root(),
        }
    }
}

/// `[executor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSection {
    #[serde(default)]
    pub mode: ExecutorMode,

    /// External executor binary, invoked as `<command> run task_spec.json`.
    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_soft_timeout_secs")]
    pub soft_timeout_secs: u64,

    #[serde(default = "default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,

    /// Simulated work time of the built-in executor.
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

fn default_command() -> String {
    "codex".to_string()
}

fn default_soft_timeout_secs() -> u64 {
    120
}

fn default_hard_timeout_secs() -> u64 {
    180
}

fn default_mock_delay_ms() -> u64 {
    250
}

impl ExecutorSection {
    pub fn soft_timeout(&self) -> Duration {
        Duration::from_secs(self.soft_timeout_secs)
    }

    pub fn hard_timeout(&self) -> Duration {
        Duration::from_secs(self.hard_timeout_secs)
    }

    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            mode: ExecutorMode::default(),
            command: default_command(),
            soft_timeout_secs: default_soft_timeout_secs(),
            hard_timeout_secs: default_hard_timeout_secs(),
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

/// `[constraints]` section, copied into every task spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintsSection {
    #[serde(default = "default_public_data_only")]
    pub public_data_only: bool,

    #[serde(default = "default_budget_usd")]
    pub budget_usd: f64,

    #[serde(default = "default_time_limit_min")]
    pub time_limit_min: u64,
}

fn default_public_data_only() -> bool {
    true
}

fn default_budget_usd() -> f64 {
    100.0
}

fn default_time_limit_min() -> u64 {
    10
}

impl Default for ConstraintsSection {
    fn default() -> Self {
        Self {
            public_data_only: default_public_data_only(),
            budget_usd: default_budget_usd(),
            time_limit_min: default_time_limit_min(),
        }
    }
}

/// `[stats]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsSection {
    #[serde(default = "default_elapsed_seconds_per_attempt")]
    pub elapsed_seconds_per_attempt: u64,

    /// Replaces the built-in per-step counter table when present.
    #[serde(default)]
    pub increments: Option<BTreeMap<String, CounterIncrement>>,
}

fn default_elapsed_seconds_per_attempt() -> u64 {
    12
}

impl Default for StatsSection {
    fn default() -> Self {
        Self {
            elapsed_seconds_per_attempt: default_elapsed_seconds_per_attempt(),
            increments: None,
        }
    }
}

/// Counter deltas applied on every attempt of one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CounterIncrement {
    #[serde(default)]
    pub hypothesis: u64,
    #[serde(default)]
    pub papers: u64,
}
