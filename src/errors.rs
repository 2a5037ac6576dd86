// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Malformed executor result: {0}")]
    MalformedResult(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Domain errors are reported to the caller and never affect run state.
    pub fn is_domain_error(&self) -> bool {
        matches!(
            self,
            OrchestratorError::ProjectNotFound(_)
                | OrchestratorError::RunNotFound(_)
                | OrchestratorError::UnknownAction(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, OrchestratorError>;
