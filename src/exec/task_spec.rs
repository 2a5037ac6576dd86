// src/exec/task_spec.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::model::ConstraintsSection;

/// Marker the executor must emit around its structured result.
pub const RESULT_MARKER: &str = "openfars_result";

/// Task description handed to the executor and written to `task_spec.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub goal: String,
    pub context: BTreeMap<String, Value>,
    pub constraints: BTreeMap<String, Value>,
    pub allowed_actions: Vec<String>,
    pub expected_outputs: Vec<String>,
    pub acceptance_checks: Vec<String>,
}

impl TaskSpec {
    /// Build the spec for one step of one run.
    pub fn for_step(
        project_id: &str,
        run_id: &str,
        step_key: &str,
        constraints: &ConstraintsSection,
    ) -> Self {
        let context = BTreeMap::from([
            ("run_id".to_string(), json!(run_id)),
            ("project_id".to_string(), json!(project_id)),
            ("step".to_string(), json!(step_key)),
        ]);
        let constraints = BTreeMap::from([
            (
                "public_data_only".to_string(),
                json!(constraints.public_data_only),
            ),
            ("budget_usd".to_string(), json!(constraints.budget_usd)),
            (
                "time_limit_min".to_string(),
                json!(constraints.time_limit_min),
            ),
        ]);

        Self {
            goal: format!("Complete step {step_key}"),
            context,
            constraints,
            allowed_actions: ["read", "write", "analyze", "report"]
                .into_iter()
                .map(String::from)
                .collect(),
            expected_outputs: vec!["step_state.json".to_string()],
            acceptance_checks: vec![format!("emit_{RESULT_MARKER}_block")],
        }
    }
}
