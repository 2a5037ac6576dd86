// src/store/mod.rs

//! Run state persistence.
//!
//! The orchestrator only talks to a [`RunStore`]; between process restarts it
//! is the sole source of truth for run and step status.
//!
//! - [`records`] defines the row types and the partial-update inputs.
//! - [`memory`] provides [`MemoryStore`], a lock-protected in-process store
//!   used by the CLI and the test suites.

use std::fmt::Debug;

use crate::catalog::StepDefinition;
use crate::errors::Result;
use crate::types::ProjectStatus;

pub mod memory;
pub mod records;

pub use memory::MemoryStore;
pub use records::{
    Artifact, Job, NewArtifact, NewJob, Project, Run, RunUpdate, Stats, StatsDelta, Step,
    StepUpdate, Timestamp,
};

/// Default page size for [`RunStore::list_jobs`].
pub const DEFAULT_JOB_LIMIT: usize = 200;

/// Durable record of projects, runs, steps, jobs, artifacts and stats.
///
/// Implementations must serialize concurrent writers. Every update refreshes
/// the row's `updated_at`. A run's step set is fixed by [`RunStore::create_run`].
pub trait RunStore: Send + Sync + Debug {
    fn create_project(&self, name: &str) -> Result<Project>;
    fn get_project(&self, project_id: &str) -> Result<Option<Project>>;
    /// Most recently updated first.
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn update_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()>;

    /// Atomically insert a `pending` run, one `pending` step per definition,
    /// a zeroed stats row, and mark the project `in_progress`.
    fn create_run(&self, project_id: &str, steps: &[StepDefinition]) -> Result<Run>;
    fn get_run(&self, run_id: &str) -> Result<Option<Run>>;
    /// Newest first.
    fn list_project_runs(&self, project_id: &str) -> Result<Vec<Run>>;
    fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<Run>;

    fn latest_run_for_project(&self, project_id: &str) -> Result<Option<Run>> {
        Ok(self.list_project_runs(project_id)?.into_iter().next())
    }

    /// Ordered by step number.
    fn list_steps(&self, run_id: &str) -> Result<Vec<Step>>;
    fn get_step_by_key(&self, run_id: &str, step_key: &str) -> Result<Option<Step>>;
    fn update_step(&self, step_id: &str, update: StepUpdate) -> Result<Step>;

    /// Reset every `error` step of the run to `pending` (clearing timestamps
    /// and error message) and the run itself to `pending`. Returns how many
    /// steps were reset.
    fn reset_failed_steps_for_retry(&self, run_id: &str) -> Result<usize>;

    fn add_job(&self, job: NewJob) -> Result<Job>;
    /// Newest first, at most `limit` entries.
    fn list_jobs(&self, run_id: &str, limit: usize) -> Result<Vec<Job>>;

    fn add_artifact(&self, artifact: NewArtifact) -> Result<Artifact>;
    /// Newest first.
    fn list_artifacts(&self, run_id: &str) -> Result<Vec<Artifact>>;

    fn get_stats(&self, run_id: &str) -> Result<Option<Stats>>;
    /// Add `delta` to the run's stats row in one write. Returns `None` when the
    /// run has no stats row.
    fn accumulate_stats(&self, run_id: &str, delta: &StatsDelta) -> Result<Option<Stats>>;
}
