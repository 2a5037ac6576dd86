// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, Utc};
use tracing::debug;
use uuid::Uuid;

use super::records::*;
use super::RunStore;
use crate::catalog::StepDefinition;
use crate::errors::{OrchestratorError, Result};
use crate::types::{ProjectStatus, RunStatus, StepStatus};

#[derive(Debug, Default)]
struct Tables {
    projects: Vec<Project>,
    runs: Vec<Run>,
    /// Steps per run, ordered by number.
    steps: HashMap<String, Vec<Step>>,
    /// step id -> owning run id
    step_owner: HashMap<String, String>,
    jobs: Vec<Job>,
    artifacts: Vec<Artifact>,
    stats: HashMap<String, Stats>,
}

/// In-process [`RunStore`]. A single mutex serializes all writers, so every
/// operation (including the multi-row `create_run`) is atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn hex_id(prefix: &str, len: usize) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..len])
}

fn project_id() -> String {
    format!("FA{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

impl RunStore for MemoryStore {
    fn create_project(&self, name: &str) -> Result<Project> {
        let mut t = self.tables();
        let mut id = project_id();
        while t.projects.iter().any(|p| p.id == id) {
            id = project_id();
        }
        let now = Utc::now();
        let project = Project {
            id,
            name: name.to_string(),
            status: ProjectStatus::InProgress,
            created_at: now,
            updated_at: now,
        };
        t.projects.push(project.clone());
        debug!(project_id = %project.id, "project created");
        Ok(project)
    }

    fn get_project(&self, project_id: &str) -> Result<Option<Project>> {
        let t = self.tables();
        Ok(t.projects.iter().find(|p| p.id == project_id).cloned())
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let t = self.tables();
        let mut projects: Vec<(usize, Project)> =
            t.projects.iter().cloned().enumerate().collect();
        projects.sort_by(|(ia, a), (ib, b)| b.updated_at.cmp(&a.updated_at).then(ib.cmp(ia)));
        Ok(projects.into_iter().map(|(_, p)| p).collect())
    }

    fn update_project_status(&self, project_id: &str, status: ProjectStatus) -> Result<()> {
        let mut t = self.tables();
        let project = t
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(())
    }

    fn create_run(&self, project_id: &str, steps: &[StepDefinition]) -> Result<Run> {
        let mut t = self.tables();
        let now = Utc::now();

        let project = t
            .projects
            .iter_mut()
            .find(|p| p.id == project_id)
            .ok_or_else(|| OrchestratorError::ProjectNotFound(project_id.to_string()))?;
        project.status = ProjectStatus::InProgress;
        project.updated_at = now;

        let run = Run {
            id: hex_id("run", 10),
            project_id: project_id.to_string(),
            status: RunStatus::Pending,
            current_step_index: 0,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        };

        let rows: Vec<Step> = steps
            .iter()
            .map(|def| Step {
                id: hex_id("step", 12),
                run_id: run.id.clone(),
                step_key: def.key.to_string(),
                number: def.number,
                title: def.title.to_string(),
                status: StepStatus::Pending,
                started_at: None,
                ended_at: None,
                error_message: None,
                updated_at: now,
            })
            .collect();

        for step in &rows {
            t.step_owner.insert(step.id.clone(), run.id.clone());
        }
        t.steps.insert(run.id.clone(), rows);
        t.stats.insert(run.id.clone(), Stats::zeroed(&run.id, now));
        t.runs.push(run.clone());

        debug!(run_id = %run.id, project_id, steps = steps.len(), "run created");
        Ok(run)
    }

    fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let t = self.tables();
        Ok(t.runs.iter().find(|r| r.id == run_id).cloned())
    }

    fn list_project_runs(&self, project_id: &str) -> Result<Vec<Run>> {
        let t = self.tables();
        Ok(t.runs
            .iter()
            .rev()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<Run> {
        let mut t = self.tables();
        let run = t
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;

        if let Some(status) = update.status {
            run.status = status;
        }
        if let Some(index) = update.current_step_index {
            run.current_step_index = index;
        }
        if let Some(started_at) = update.started_at {
            run.started_at = started_at;
        }
        if let Some(ended_at) = update.ended_at {
            run.ended_at = ended_at;
        }
        run.updated_at = Utc::now();
        Ok(run.clone())
    }

    fn list_steps(&self, run_id: &str) -> Result<Vec<Step>> {
        let t = self.tables();
        Ok(t.steps.get(run_id).cloned().unwrap_or_default())
    }

    fn get_step_by_key(&self, run_id: &str, step_key: &str) -> Result<Option<Step>> {
        let t = self.tables();
        Ok(t.steps
            .get(run_id)
            .and_then(|steps| steps.iter().find(|s| s.step_key == step_key))
            .cloned())
    }

    fn update_step(&self, step_id: &str, update: StepUpdate) -> Result<Step> {
        let mut t = self.tables();
        let not_found = || OrchestratorError::StepNotFound(step_id.to_string());

        let run_id = t.step_owner.get(step_id).cloned().ok_or_else(not_found)?;
        let step = t
            .steps
            .get_mut(&run_id)
            .and_then(|steps| steps.iter_mut().find(|s| s.id == step_id))
            .ok_or_else(not_found)?;

        if let Some(status) = update.status {
            step.status = status;
        }
        if let Some(started_at) = update.started_at {
            step.started_at = started_at;
        }
        if let Some(ended_at) = update.ended_at {
            step.ended_at = ended_at;
        }
        if let Some(error_message) = update.error_message {
            step.error_message = error_message;
        }
        step.updated_at = Utc::now();
        Ok(step.clone())
    }

    fn reset_failed_steps_for_retry(&self, run_id: &str) -> Result<usize> {
        let mut t = self.tables();
        let now = Utc::now();

        let run = t
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| OrchestratorError::RunNotFound(run_id.to_string()))?;
        run.status = RunStatus::Pending;
        run.ended_at = None;
        run.updated_at = now;

        let mut reset = 0;
        if let Some(steps) = t.steps.get_mut(run_id) {
            for step in steps.iter_mut().filter(|s| s.status == StepStatus::Error) {
                step.status = StepStatus::Pending;
                step.started_at = None;
                step.ended_at = None;
                step.error_message = None;
                step.updated_at = now;
                reset += 1;
            }
        }
        debug!(run_id, reset, "failed steps reset for retry");
        Ok(reset)
    }

    fn add_job(&self, job: NewJob) -> Result<Job> {
        let mut t = self.tables();
        let row = Job {
            id: hex_id("job", 12),
            run_id: job.run_id,
            step_id: job.step_id,
            time: Local::now().format("%H:%M").to_string(),
            title: job.title,
            content: job.content,
            status: job.status,
            worked_for: job.worked_for,
            source: job.source,
            level: job.level,
            raw: job.raw,
            created_at: Utc::now(),
        };
        t.jobs.push(row.clone());
        Ok(row)
    }

    fn list_jobs(&self, run_id: &str, limit: usize) -> Result<Vec<Job>> {
        let t = self.tables();
        Ok(t.jobs
            .iter()
            .rev()
            .filter(|j| j.run_id == run_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn add_artifact(&self, artifact: NewArtifact) -> Result<Artifact> {
        let mut t = self.tables();
        let row = Artifact {
            id: hex_id("artifact", 12),
            run_id: artifact.run_id,
            step_id: artifact.step_id,
            path: artifact.path,
            size: artifact.size,
            hash: artifact.hash,
            created_at: Utc::now(),
        };
        t.artifacts.push(row.clone());
        Ok(row)
    }

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<Artifact>> {
        let t = self.tables();
        Ok(t.artifacts
            .iter()
            .rev()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect())
    }

    fn get_stats(&self, run_id: &str) -> Result<Option<Stats>> {
        let t = self.tables();
        Ok(t.stats.get(run_id).cloned())
    }

    fn accumulate_stats(&self, run_id: &str, delta: &StatsDelta) -> Result<Option<Stats>> {
        let mut t = self.tables();
        Ok(t.stats.get_mut(run_id).map(|stats| {
            stats.apply(delta, Utc::now());
            stats.clone()
        }))
    }
}
