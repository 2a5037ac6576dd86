// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{OrchestratorError, Result};

pub const ENV_EXECUTOR_MODE: &str = "OPENFARS_CODEX_MODE";
pub const ENV_EXECUTOR_COMMAND: &str = "OPENFARS_CODEX_COMMAND";
pub const ENV_WORKSPACE_ROOT: &str = "OPENFARS_WORKSPACE_ROOT";

/// Load a configuration file and return the raw, unvalidated `RawConfigFile`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file, apply environment overrides and validate it.
///
/// A missing file at the default location is not an error: defaults are used.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let raw = if !path.exists() && path == default_config_path().as_path() {
        debug!(?path, "no config file found; using defaults");
        RawConfigFile::default()
    } else {
        load_from_path(path)?
    };
    let raw = apply_env_overrides(raw)?;
    ConfigFile::try_from(raw)
}

/// Apply `OPENFARS_*` environment variables on top of a raw config.
pub fn apply_env_overrides(raw: RawConfigFile) -> Result<RawConfigFile> {
    apply_overrides(raw, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary lookup; empty values are ignored.
pub fn apply_overrides(
    mut raw: RawConfigFile,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<RawConfigFile> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(mode) = get(ENV_EXECUTOR_MODE) {
        raw.executor.mode = mode.parse().map_err(|e: String| {
            OrchestratorError::ConfigError(format!("{ENV_EXECUTOR_MODE}: {e}"))
        })?;
    }
    if let Some(command) = get(ENV_EXECUTOR_COMMAND) {
        raw.executor.command = command;
    }
    if let Some(root) = get(ENV_WORKSPACE_ROOT) {
        raw.orchestrator.workspace_root = PathBuf::from(root);
    }
    Ok(raw)
}

/// `OpenFARS.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("OpenFARS.toml")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::types::ExecutorMode;

    #[test]
    fn overrides_replace_file_values() {
        let env = HashMap::from([
            (ENV_EXECUTOR_MODE, "real"),
            (ENV_EXECUTOR_COMMAND, "/opt/codex"),
            (ENV_WORKSPACE_ROOT, ""),
        ]);
        let raw = apply_overrides(RawConfigFile::default(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(raw.executor.mode, ExecutorMode::Cli);
        assert_eq!(raw.executor.command, "/opt/codex");
        assert_eq!(raw.orchestrator.workspace_root, PathBuf::from("workspace"));
    }

    #[test]
    fn invalid_mode_override_is_config_error() {
        let err = apply_overrides(RawConfigFile::default(), |k| {
            (k == ENV_EXECUTOR_MODE).then(|| "docker".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigError(_)));
    }
}
