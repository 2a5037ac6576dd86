// src/config/validate.rs

use crate::catalog;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};
use crate::types::ExecutorMode;

/// Upper bound on `[orchestrator].max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = OrchestratorError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_orchestrator(cfg)?;
    validate_executor(cfg)?;
    validate_constraints(cfg)?;
    validate_stats(cfg)?;
    Ok(())
}

fn validate_orchestrator(cfg: &RawConfigFile) -> Result<()> {
    if cfg.orchestrator.max_retries > MAX_RETRIES_LIMIT {
        return Err(OrchestratorError::ConfigError(format!(
            "[orchestrator].max_retries must be <= {MAX_RETRIES_LIMIT} (got {})",
            cfg.orchestrator.max_retries
        )));
    }
    if cfg.orchestrator.workspace_root.as_os_str().is_empty() {
        return Err(OrchestratorError::ConfigError(
            "[orchestrator].workspace_root must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_executor(cfg: &RawConfigFile) -> Result<()> {
    let exec = &cfg.executor;
    if exec.soft_timeout_secs == 0 {
        return Err(OrchestratorError::ConfigError(
            "[executor].soft_timeout_secs must be >= 1 (got 0)".to_string(),
        ));
    }
    if exec.hard_timeout_secs < exec.soft_timeout_secs {
        return Err(OrchestratorError::ConfigError(format!(
            "[executor].hard_timeout_secs ({}) must be >= soft_timeout_secs ({})",
            exec.hard_timeout_secs, exec.soft_timeout_secs
        )));
    }
    if exec.mode == ExecutorMode::Cli && exec.command.trim().is_empty() {
        return Err(OrchestratorError::ConfigError(
            "[executor].command must be set when mode = \"cli\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_constraints(cfg: &RawConfigFile) -> Result<()> {
    let budget = cfg.constraints.budget_usd;
    if !budget.is_finite() || budget < 0.0 {
        return Err(OrchestratorError::ConfigError(format!(
            "[constraints].budget_usd must be a non-negative number (got {budget})"
        )));
    }
    Ok(())
}

fn validate_stats(cfg: &RawConfigFile) -> Result<()> {
    let Some(increments) = &cfg.stats.increments else {
        return Ok(());
    };
    for key in increments.keys() {
        if !catalog::contains(key) {
            return Err(OrchestratorError::ConfigError(format!(
                "[stats.increments] names unknown step '{key}'"
            )));
        }
    }
    Ok(())
}
