// src/exec/mod.rs

//! Step execution layer.
//!
//! - [`backend`] defines the `StepExecutor` trait the orchestrator drives, and
//!   the normalized request/result types exchanged with it.
//! - [`mock`] is the deterministic built-in executor.
//! - [`process`] runs the external executor command under soft/hard timeouts.
//! - [`parser`] extracts the `<openfars_result>` block from executor output.
//! - [`policy`] holds the host safety checks.
//! - [`task_spec`] builds the task description handed to the executor.

pub mod backend;
pub mod mock;
pub mod parser;
pub mod policy;
pub mod process;
pub mod task_spec;

pub use backend::{AttemptStatus, LogEntry, StepExecutor, StepMetrics, StepRequest, StepResult};
pub use mock::MockExecutor;
pub use parser::{parse_result_block, ParsedResult};
pub use policy::Policy;
pub use process::CliExecutor;
pub use task_spec::TaskSpec;
