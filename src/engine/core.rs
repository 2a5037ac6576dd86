// src/engine/core.rs

//! Pure decision logic for the execution loop.
//!
//! Nothing in here touches Tokio, the store or the filesystem; the async
//! shell in [`runner`](super::runner) performs the side effects these
//! functions ask for.

use crate::store::Step;
use crate::types::StepStatus;

/// What the loop does after an attempt has finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Step succeeded; move on to the next one.
    Complete,
    /// Mark the step `error` with `message`, back off, try again.
    Retry { message: String },
    /// Mark the step `error` with `reason` and fail the run.
    Fail { reason: String },
}

/// Decide the fate of `attempt` (1-based) given its outcome.
///
/// A step gets at most `max_retries + 1` attempts.
pub fn decide(
    success: bool,
    retriable: bool,
    summary: &str,
    attempt: u32,
    max_retries: u32,
) -> AttemptDecision {
    if success {
        return AttemptDecision::Complete;
    }
    if retriable && attempt <= max_retries {
        return AttemptDecision::Retry {
            message: format!("{summary}; retry {attempt}/{max_retries}"),
        };
    }
    AttemptDecision::Fail {
        reason: summary.to_string(),
    }
}

/// Index of the first step that is not `completed`, or `steps.len()` when
/// every step has completed.
pub fn resume_index(steps: &[Step]) -> usize {
    steps
        .iter()
        .position(|s| s.status != StepStatus::Completed)
        .unwrap_or(steps.len())
}
