// tests/config_loading.rs

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use openfars::config::{apply_overrides, load_and_validate, load_from_path, ConfigFile};
use openfars::engine::RunOrchestrator;
use openfars::errors::OrchestratorError;
use openfars::store::MemoryStore;
use openfars::types::ExecutorMode;
use openfars_test_utils::builders::ConfigFileBuilder;

const FULL_CONFIG: &str = r#"
[orchestrator]
max_retries = 4
retry_backoff_ms = 50
workspace_root = "/srv/openfars/workspace"

[executor]
mode = "cli"
command = "codex"
soft_timeout_secs = 30
hard_timeout_secs = 45
mock_delay_ms = 0

[constraints]
public_data_only = false
budget_usd = 12.5
time_limit_min = 3

[stats]
elapsed_seconds_per_attempt = 7

[stats.increments.literature_review]
papers = 3
"#;

#[test]
fn full_config_round_trips_into_sections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("OpenFARS.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.orchestrator.max_retries, 4);
    assert_eq!(cfg.orchestrator.retry_backoff_ms, 50);
    assert_eq!(
        cfg.orchestrator.workspace_root,
        PathBuf::from("/srv/openfars/workspace")
    );
    assert_eq!(cfg.executor.mode, ExecutorMode::Cli);
    assert_eq!(cfg.executor.hard_timeout_secs, 45);
    assert!(!cfg.constraints.public_data_only);
    assert_eq!(cfg.constraints.budget_usd, 12.5);
    assert_eq!(cfg.stats.elapsed_seconds_per_attempt, 7);

    let increments = cfg.stats.increments.as_ref().unwrap();
    assert_eq!(increments["literature_review"].papers, 3);
    assert_eq!(increments["literature_review"].hypothesis, 0);
}

#[test]
fn missing_explicit_path_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, OrchestratorError::IoError(_)));
}

#[test]
fn malformed_toml_is_toml_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[orchestrator\nmax_retries = 1").unwrap();
    assert!(matches!(
        load_from_path(&path),
        Err(OrchestratorError::TomlError(_))
    ));
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("typo.toml");
    fs::write(&path, "[executor]\ncomand = \"codex\"\n").unwrap();
    assert!(matches!(
        load_from_path(&path),
        Err(OrchestratorError::TomlError(_))
    ));
}

#[test]
fn semantic_errors_are_config_errors() {
    let raw = ConfigFileBuilder::new().timeouts_secs(0, 10).raw();
    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(OrchestratorError::ConfigError(_))
    ));
}

#[test]
fn overrides_are_applied_before_validation() {
    let raw = ConfigFileBuilder::new().mode(ExecutorMode::Cli).raw();
    let raw = apply_overrides(raw, |key| match key {
        "OPENFARS_CODEX_MODE" => Some("mock".to_string()),
        "OPENFARS_WORKSPACE_ROOT" => Some("/tmp/openfars-ws".to_string()),
        _ => None,
    })
    .unwrap();
    let cfg = ConfigFile::try_from(raw).unwrap();
    assert_eq!(cfg.executor.mode, ExecutorMode::Mock);
    assert_eq!(cfg.orchestrator.workspace_root, PathBuf::from("/tmp/openfars-ws"));
}

#[test]
fn orchestrator_picks_up_config_values() {
    let cfg = ConfigFileBuilder::new()
        .max_retries(5)
        .retry_backoff_ms(10)
        .workspace_root("/data/ws")
        .timeouts_secs(3, 4)
        .increment("topic_scoping", 1, 0)
        .build();
    let orchestrator = RunOrchestrator::from_config(&cfg, Arc::new(MemoryStore::new()));

    let options = orchestrator.options();
    assert_eq!(options.max_retries, 5);
    assert_eq!(options.retry_backoff.as_millis(), 10);
    assert_eq!(options.workspace_root, PathBuf::from("/data/ws"));
    assert_eq!(options.soft_timeout.as_secs(), 3);
    assert_eq!(options.hard_timeout.as_secs(), 4);
}
