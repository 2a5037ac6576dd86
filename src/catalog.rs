// src/catalog.rs

//! The fixed, ordered pipeline every run walks through.
//!
//! Step rows are materialized from this list when a run is created, and the
//! execution loop looks entries up by key. Nothing mutates it at runtime.

use serde::Serialize;

/// Static definition of one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub key: &'static str,
    /// 1-based position in the pipeline.
    pub number: u32,
    pub title: &'static str,
    /// Whether the external executor is invoked for this step. When `false`
    /// the built-in executor handles it even in `cli` mode.
    pub executor_enabled: bool,
}

const fn step(
    key: &'static str,
    number: u32,
    title: &'static str,
    executor_enabled: bool,
) -> StepDefinition {
    StepDefinition {
        key,
        number,
        title,
        executor_enabled,
    }
}

pub const STEP_CATALOG: [StepDefinition; 8] = [
    step("topic_scoping", 1, "Topic Scoping", false),
    step("literature_review", 2, "Literature Review", false),
    step("hypothesis_generation", 3, "Hypothesis Generation", true),
    step("experiment_planning", 4, "Experiment Planning", true),
    step("code_and_execute", 5, "Code and Execute", true),
    step("result_analysis", 6, "Result Analysis", true),
    step("paper_drafting", 7, "Paper Drafting", true),
    step("final_packaging", 8, "Final Packaging", false),
];

/// All steps in pipeline order.
pub fn steps() -> &'static [StepDefinition] {
    &STEP_CATALOG
}

/// Look up a step by key.
pub fn find(key: &str) -> Option<&'static StepDefinition> {
    STEP_CATALOG.iter().find(|s| s.key == key)
}

pub fn contains(key: &str) -> bool {
    find(key).is_some()
}

pub fn len() -> usize {
    STEP_CATALOG.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_contiguous_from_one() {
        for (idx, def) in steps().iter().enumerate() {
            assert_eq!(def.number as usize, idx + 1, "step {}", def.key);
        }
        assert_eq!(len(), 8);
    }

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = steps().iter().map(|s| s.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), len());
    }

    #[test]
    fn find_by_key() {
        let def = find("code_and_execute").unwrap();
        assert_eq!(def.number, 5);
        assert!(def.executor_enabled);
        assert!(find("nope").is_none());
    }
}
