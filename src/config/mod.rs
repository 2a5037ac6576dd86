// src/config/mod.rs

//! Configuration loading and validation for openfars.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading from disk and environment overrides.
//! - `validate.rs`: turning a `RawConfigFile` into a validated `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{apply_env_overrides, apply_overrides, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConstraintsSection, CounterIncrement, ExecutorSection, OrchestratorSection,
    RawConfigFile, StatsSection,
};
