// src/engine/orchestrator.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::catalog;
use crate::config::model::{ConfigFile, ConstraintsSection};
use crate::errors::{OrchestratorError, Result};
use crate::events::{EventBus, EventName, Subscription};
use crate::exec::{CliExecutor, MockExecutor, StepExecutor};
use crate::store::{Artifact, Job, Project, Run, RunStore, RunUpdate, Step, DEFAULT_JOB_LIMIT};
use crate::types::{ControlAction, ExecutorMode, RunStatus};

use super::control::{ControlRegistry, RunControl};
use super::stats::{StatsPolicy, StatsView};

/// Knobs of the execution loop.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub workspace_root: PathBuf,
    pub soft_timeout: Duration,
    pub hard_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&ConfigFile::default())
    }
}

impl RunOptions {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            max_retries: cfg.orchestrator.max_retries,
            retry_backoff: cfg.orchestrator.retry_backoff(),
            workspace_root: cfg.orchestrator.workspace_root.clone(),
            soft_timeout: cfg.executor.soft_timeout(),
            hard_timeout: cfg.executor.hard_timeout(),
        }
    }
}

/// Everything an observer needs to render a run from scratch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub run: Run,
    pub steps: Vec<Step>,
    /// Newest first.
    pub jobs: Vec<Job>,
    /// Newest first.
    pub artifacts: Vec<Artifact>,
    pub stats: StatsView,
}

pub(crate) struct Inner {
    pub(crate) store: Arc<dyn RunStore>,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) executor: Arc<dyn StepExecutor>,
    pub(crate) controls: ControlRegistry,
    pub(crate) options: RunOptions,
    pub(crate) stats_policy: StatsPolicy,
    pub(crate) constraints: ConstraintsSection,
}

impl Inner {
    pub(crate) fn publish(&self, run_id: &str, event: EventName, payload: Value) {
        self.bus.publish(run_id, event, payload);
    }

    pub(crate) fn stats_view(&self, run_id: &str) -> StatsView {
        match self.store.get_stats(run_id) {
            Ok(stats) => StatsView::for_run(run_id, stats.as_ref()),
            Err(err) => {
                warn!(run_id, error = %err, "reading stats failed; reporting zero view");
                StatsView::zero(run_id)
            }
        }
    }
}

/// Drives runs through the step catalog and exposes their control surface.
///
/// Cheap to clone; clones share the same store, event bus, executor and
/// control registry. Each started run gets one background Tokio task.
///
/// Cancellation is cooperative at step granularity: a `cancel` is observed
/// when the loop reaches the next step boundary, never in the middle of an
/// attempt. The executor's soft/hard timeouts are what bound an attempt.
#[derive(Clone)]
pub struct RunOrchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("store", &self.inner.store)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RunOrchestrator`].
pub struct OrchestratorBuilder {
    store: Arc<dyn RunStore>,
    executor: Arc<dyn StepExecutor>,
    bus: Option<Arc<EventBus>>,
    options: RunOptions,
    stats_policy: StatsPolicy,
    constraints: ConstraintsSection,
}

impl OrchestratorBuilder {
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.options.max_retries = max_retries;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.options.retry_backoff = backoff;
        self
    }

    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.workspace_root = root.into();
        self
    }

    pub fn stats_policy(mut self, policy: StatsPolicy) -> Self {
        self.stats_policy = policy;
        self
    }

    pub fn constraints(mut self, constraints: ConstraintsSection) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn build(self) -> RunOrchestrator {
        RunOrchestrator {
            inner: Arc::new(Inner {
                store: self.store,
                bus: self.bus.unwrap_or_default(),
                executor: self.executor,
                controls: ControlRegistry::new(),
                options: self.options,
                stats_policy: self.stats_policy,
                constraints: self.constraints,
            }),
        }
    }
}

/// Executor selected by `[executor].mode`.
pub fn executor_from_config(cfg: &ConfigFile) -> Arc<dyn StepExecutor> {
    let mock = MockExecutor::new(cfg.executor.mock_delay());
    match cfg.executor.mode {
        ExecutorMode::Mock => Arc::new(mock),
        ExecutorMode::Cli => Arc::new(CliExecutor::new(cfg.executor.command.clone(), mock)),
    }
}

impl RunOrchestrator {
    pub fn builder(store: Arc<dyn RunStore>, executor: Arc<dyn StepExecutor>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            store,
            executor,
            bus: None,
            options: RunOptions::default(),
            stats_policy: StatsPolicy::default(),
            constraints: ConstraintsSection::default(),
        }
    }

    /// Wire an orchestrator from validated config.
    pub fn from_config(cfg: &ConfigFile, store: Arc<dyn RunStore>) -> Self {
        Self::builder(store, executor_from_config(cfg))
            .options(RunOptions::from_config(cfg))
            .stats_policy(StatsPolicy::from_config(&cfg.stats))
            .constraints(cfg.constraints.clone())
            .build()
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.inner.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn options(&self) -> &RunOptions {
        &self.inner.options
    }

    pub fn create_project(&self, name: &str) -> Result<Project> {
        let project = self.inner.store.create_project(name)?;
        info!(project_id = %project.id, name, "project created");
        Ok(project)
    }

    /// Create a `pending` run with one `pending` step per catalog entry and a
    /// zeroed stats row.
    pub fn create_run(&self, project_id: &str) -> Result<Run> {
        let run = self.inner.store.create_run(project_id, catalog::steps())?;
        self.inner.controls.get_or_create(&run.id);
        info!(run_id = %run.id, project_id, "run created");
        Ok(run)
    }

    /// Open the gate, clear cancellation and launch the execution loop if
    /// none is active for this run. Returns whether a loop was launched.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_run(&self, run_id: &str) -> bool {
        let control = self.inner.controls.get_or_create(run_id);
        control.open_gate();
        control.clear_cancel();
        self.spawn_loop(run_id, &control)
    }

    fn spawn_loop(&self, run_id: &str, control: &Arc<RunControl>) -> bool {
        let inner = Arc::clone(&self.inner);
        let id = run_id.to_string();
        let spawned = control.spawn_if_idle(move |ticket| async move {
            inner.execute_run(&id, &ticket).await;
        });
        if spawned {
            debug!(run_id, "execution loop launched");
        } else {
            debug!(run_id, "execution loop already active; start ignored");
        }
        spawned
    }

    /// Parse `action` and apply it. Unknown actions fail with
    /// [`OrchestratorError::UnknownAction`] before anything is touched.
    pub fn apply_control(&self, run_id: &str, action: &str) -> Result<Run> {
        let action: ControlAction = action.parse()?;
        self.control(run_id, action)
    }

    /// Apply a control action and return the run as persisted afterwards.
    pub fn control(&self, run_id: &str, action: ControlAction) -> Result<Run> {
        let store = &self.inner.store;
        let run = store
            .get_run(run_id)?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;
        let control = self.inner.controls.get_or_create(run_id);
        info!(run_id, %action, "control action");

        match action {
            ControlAction::Pause => {
                control.close_gate();
                let run = if run.status.is_terminal() {
                    run
                } else {
                    store.update_run(run_id, RunUpdate::status(RunStatus::Paused))?
                };
                self.inner
                    .publish(run_id, EventName::StepUpdated, json!({ "run": run }));
                Ok(run)
            }
            ControlAction::Resume => {
                control.open_gate();
                let run = if matches!(run.status, RunStatus::Paused | RunStatus::Pending) {
                    store.update_run(run_id, RunUpdate::status(RunStatus::Running))?
                } else {
                    run
                };
                if !control.is_active() {
                    self.start_run(run_id);
                }
                Ok(run)
            }
            ControlAction::Cancel => {
                control.request_cancel();
                control.open_gate();
                Ok(run)
            }
            ControlAction::Retry => {
                let reset = store.reset_failed_steps_for_retry(run_id)?;
                debug!(run_id, reset, "failed steps reset for retry");
                self.start_run(run_id);
                store
                    .get_run(run_id)?
                    .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))
            }
        }
    }

    /// Display-ready stats; the zero view for unknown runs.
    pub fn get_stats_view(&self, run_id: &str) -> StatsView {
        self.inner.stats_view(run_id)
    }

    pub fn run_snapshot(&self, run_id: &str) -> Result<RunSnapshot> {
        let store = &self.inner.store;
        let run = store
            .get_run(run_id)?
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;
        Ok(RunSnapshot {
            run,
            steps: store.list_steps(run_id)?,
            jobs: store.list_jobs(run_id, DEFAULT_JOB_LIMIT)?,
            artifacts: store.list_artifacts(run_id)?,
            stats: self.inner.stats_view(run_id),
        })
    }

    /// Subscribe to a run's events. The first message is a `snapshot` event;
    /// everything published afterwards follows in publish order.
    ///
    /// Records may appear both in the snapshot and in a later event; observers
    /// deduplicate by record id.
    pub fn attach(&self, run_id: &str, capacity: usize) -> Result<Subscription> {
        if self.inner.store.get_run(run_id)?.is_none() {
            return Err(OrchestratorError::RunNotFound(run_id.to_string()));
        }
        let subscription = self.inner.bus.subscribe_with_snapshot(run_id, capacity, || {
            match self.run_snapshot(run_id) {
                Ok(snapshot) => json!(snapshot),
                Err(err) => {
                    warn!(run_id, error = %err, "building snapshot failed");
                    json!({ "error": err.to_string() })
                }
            }
        });
        Ok(subscription)
    }

    pub fn detach(&self, run_id: &str, subscription: &Subscription) {
        self.inner.bus.unsubscribe(run_id, subscription.id);
    }

    /// Whether an execution loop is currently running for `run_id`.
    pub fn is_active(&self, run_id: &str) -> bool {
        self.inner
            .controls
            .get(run_id)
            .is_some_and(|control| control.is_active())
    }

    /// Wait until no execution loop is running for `run_id`.
    pub async fn wait_for_idle(&self, run_id: &str) {
        if let Some(control) = self.inner.controls.get(run_id) {
            control.wait_idle().await;
        }
    }
}
