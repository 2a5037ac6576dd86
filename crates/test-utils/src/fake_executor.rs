use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use openfars::exec::{LogEntry, StepExecutor, StepMetrics, StepRequest, StepResult};
use tokio::sync::Notify;

/// Scripted outcome for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    FailRetriable,
    FailTerminal,
}

/// Signals for a step held open by [`ScriptedExecutor::hold`].
#[derive(Debug, Clone, Default)]
pub struct StepHold {
    /// Notified when the held attempt starts.
    pub entered: Arc<Notify>,
    /// Notify once to let the held attempt finish.
    pub release: Arc<Notify>,
}

/// A fake executor that:
/// - records every `(step, attempt)` it is asked to run
/// - plays back scripted outcomes per step (success once the script is empty)
/// - writes requested artifact files on success
/// - can hold one attempt of a step open until the test releases it.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    calls: Mutex<Vec<(String, u32)>>,
    script: Mutex<HashMap<String, VecDeque<Outcome>>>,
    artifacts: Mutex<HashMap<String, Vec<String>>>,
    holds: Mutex<HashMap<String, StepHold>>,
}

impl ScriptedExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `times` failures for `step`.
    pub fn fail(&self, step: &str, times: usize, retriable: bool) {
        let outcome = if retriable {
            Outcome::FailRetriable
        } else {
            Outcome::FailTerminal
        };
        let mut script = self.script.lock().unwrap();
        let queue = script.entry(step.to_string()).or_default();
        queue.extend(std::iter::repeat_n(outcome, times));
    }

    /// Write `file_name` into the step workspace when `step` succeeds.
    pub fn produce(&self, step: &str, file_name: &str) {
        self.artifacts
            .lock()
            .unwrap()
            .entry(step.to_string())
            .or_default()
            .push(file_name.to_string());
    }

    /// Hold the next attempt of `step` until released.
    pub fn hold(&self, step: &str) -> StepHold {
        let hold = StepHold::default();
        self.holds
            .lock()
            .unwrap()
            .insert(step.to_string(), hold.clone());
        hold
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn attempts_for(&self, step: &str) -> usize {
        self.calls().iter().filter(|(s, _)| s == step).count()
    }

    pub fn steps_run(&self) -> Vec<String> {
        let mut steps: Vec<String> = Vec::new();
        for (step, _) in self.calls() {
            if steps.last() != Some(&step) {
                steps.push(step);
            }
        }
        steps
    }

    async fn execute(&self, request: StepRequest) -> StepResult {
        self.calls
            .lock()
            .unwrap()
            .push((request.step_key.clone(), request.attempt));

        let hold = self.holds.lock().unwrap().remove(&request.step_key);
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }

        let outcome = self
            .script
            .lock()
            .unwrap()
            .get_mut(&request.step_key)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Outcome::Succeed);

        let log = LogEntry {
            title: "Scripted".into(),
            content: format!("{} attempt {}", request.step_key, request.attempt),
            status: if outcome == Outcome::Succeed { "completed" } else { "error" }.into(),
            worked_for: "0.0s".into(),
            source: "test".into(),
            level: "info".into(),
            raw: String::new(),
        };
        let metrics = StepMetrics {
            tokens: 1_000,
            cost_usd: 0.1,
            token_cost_usd: 0.1,
            gpu_hours: 0.01,
        };

        match outcome {
            Outcome::Succeed => {
                let files = self
                    .artifacts
                    .lock()
                    .unwrap()
                    .get(&request.step_key)
                    .cloned()
                    .unwrap_or_default();
                let mut artifacts = Vec::new();
                for name in files {
                    let path = request.workspace_dir.join(&name);
                    tokio::fs::write(&path, name.as_bytes()).await.unwrap();
                    artifacts.push(path);
                }
                StepResult {
                    status: openfars::exec::AttemptStatus::Success,
                    summary: "ok".into(),
                    logs: vec![log],
                    artifacts,
                    metrics,
                    retriable: false,
                }
            }
            Outcome::FailRetriable => {
                let mut result = StepResult::failed("scripted transient failure", true, vec![log]);
                result.metrics = metrics;
                result
            }
            Outcome::FailTerminal => {
                StepResult::failed("scripted terminal failure", false, vec![log])
            }
        }
    }
}

impl StepExecutor for ScriptedExecutor {
    fn run_step(
        &self,
        request: StepRequest,
    ) -> Pin<Box<dyn Future<Output = StepResult> + Send + '_>> {
        Box::pin(self.execute(request))
    }
}
