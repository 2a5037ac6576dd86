// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `openfars`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "openfars",
    version,
    about = "Drive a research run through the step pipeline and stream its events.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `OpenFARS.toml` in the current working directory; built-in
    /// defaults are used when that file does not exist.
    #[arg(long, value_name = "PATH", default_value = "OpenFARS.toml")]
    pub config: String,

    /// Name of the project the run is created under.
    #[arg(long, value_name = "NAME", default_value = "OpenFARS project")]
    pub project: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `OPENFARS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate config and print it with the step catalog; run nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_flags_given() {
        let args = CliArgs::try_parse_from(["openfars"]).unwrap();
        assert_eq!(args.config, "OpenFARS.toml");
        assert!(!args.dry_run);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn flags_are_parsed() {
        let args = CliArgs::try_parse_from([
            "openfars",
            "--config",
            "cfg/run.toml",
            "--project",
            "Graph study",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.config, "cfg/run.toml");
        assert_eq!(args.project, "Graph study");
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
    }
}
