#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use openfars::config::{ConfigFile, CounterIncrement, RawConfigFile};
use openfars::engine::{RunOptions, RunOrchestrator};
use openfars::exec::StepExecutor;
use openfars::store::{MemoryStore, Project, RunStore};
use openfars::types::ExecutorMode;
use tempfile::TempDir;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.orchestrator.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.orchestrator.retry_backoff_ms = ms;
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.orchestrator.workspace_root = root.into();
        self
    }

    pub fn mode(mut self, mode: ExecutorMode) -> Self {
        self.config.executor.mode = mode;
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.config.executor.command = command.to_string();
        self
    }

    pub fn timeouts_secs(mut self, soft: u64, hard: u64) -> Self {
        self.config.executor.soft_timeout_secs = soft;
        self.config.executor.hard_timeout_secs = hard;
        self
    }

    pub fn mock_delay_ms(mut self, ms: u64) -> Self {
        self.config.executor.mock_delay_ms = ms;
        self
    }

    pub fn increment(mut self, step: &str, hypothesis: u64, papers: u64) -> Self {
        self.config
            .stats
            .increments
            .get_or_insert_with(BTreeMap::new)
            .insert(step.to_string(), CounterIncrement { hypothesis, papers });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrator over a fresh in-memory store and a temporary workspace, with
/// one project already created.
pub struct Harness {
    pub orchestrator: RunOrchestrator,
    pub store: Arc<MemoryStore>,
    pub project: Project,
    pub workspace: TempDir,
}

impl Harness {
    /// Fast defaults: no backoff, two retries.
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self::with_options(executor, |options| options)
    }

    pub fn with_options(
        executor: Arc<dyn StepExecutor>,
        customize: impl FnOnce(RunOptions) -> RunOptions,
    ) -> Self {
        let workspace = tempfile::tempdir().expect("create temp workspace");
        let store = Arc::new(MemoryStore::new());
        let options = customize(RunOptions {
            max_retries: 2,
            retry_backoff: Duration::ZERO,
            workspace_root: workspace.path().join("workspace"),
            soft_timeout: Duration::from_secs(5),
            hard_timeout: Duration::from_secs(10),
        });
        let orchestrator = RunOrchestrator::builder(store.clone(), executor)
            .options(options)
            .build();
        let project = store.create_project("test project").expect("create project");
        Self {
            orchestrator,
            store,
            project,
            workspace,
        }
    }

    /// Second orchestrator over the same store, as after a process restart.
    pub fn restarted(&self, executor: Arc<dyn StepExecutor>) -> RunOrchestrator {
        RunOrchestrator::builder(self.store.clone(), executor)
            .options(self.orchestrator.options().clone())
            .build()
    }

    pub fn workspace_root(&self) -> &Path {
        &self.orchestrator.options().workspace_root
    }
}
