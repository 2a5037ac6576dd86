// src/engine/mod.rs

//! Run orchestration engine.
//!
//! - [`core`]: pure attempt decisions and resume-point computation.
//! - [`control`]: per-run gate, cancellation flag and task handle.
//! - [`stats`]: stats increment table and display formatting.
//! - [`orchestrator`]: the public control surface.
//! - [`runner`]: the async execution loop driven per run.

pub mod control;
pub mod core;
pub mod orchestrator;
pub mod runner;
pub mod stats;

pub use control::{ActiveTicket, ControlRegistry, RunControl};
pub use core::{decide, resume_index, AttemptDecision};
pub use orchestrator::{
    executor_from_config, OrchestratorBuilder, RunOptions, RunOrchestrator, RunSnapshot,
};
pub use runner::CANCELLED_REASON;
pub use stats::{format_duration, format_tokens, StatsPolicy, StatsView};
