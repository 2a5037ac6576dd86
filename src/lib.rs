// src/lib.rs

pub mod artifacts;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod store;
pub mod types;

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::RunOrchestrator;
use crate::store::MemoryStore;
use crate::types::{ControlAction, RunStatus};

/// Events buffered per subscriber before it is considered too slow.
const SUBSCRIBER_CAPACITY: usize = 1024;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - store, event bus, executor and orchestrator
/// - one run, streamed to stdout as JSON lines
/// - Ctrl-C mapped to the `cancel` control action
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(());
    }

    let store = Arc::new(MemoryStore::new());
    let orchestrator = RunOrchestrator::from_config(&cfg, store);

    let project = orchestrator.create_project(&args.project)?;
    let run = orchestrator.create_run(&project.id)?;
    let run_id = run.id.clone();
    info!(run_id = %run_id, project_id = %project.id, mode = ?cfg.executor.mode, "starting run");

    let mut subscription = orchestrator.attach(&run_id, SUBSCRIBER_CAPACITY)?;
    orchestrator.start_run(&run_id);

    // Ctrl-C → cooperative cancel at the next step boundary.
    {
        let orchestrator = orchestrator.clone();
        let run_id = run_id.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!(run_id = %run_id, "Ctrl+C received; cancelling run");
            if let Err(e) = orchestrator.control(&run_id, ControlAction::Cancel) {
                warn!(error = %e, "cancel failed");
            }
        });
    }

    while let Some(message) = subscription.receiver.recv().await {
        let line = serde_json::to_string(&message)?;
        {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{line}")?;
            stdout.flush()?;
        }
        if message.event.is_terminal() {
            debug!(event = %message.event, "terminal event received");
            break;
        }
    }

    let final_run = orchestrator.run_snapshot(&run_id)?.run;
    match final_run.status {
        RunStatus::Completed => Ok(()),
        status => bail!("run {run_id} ended with status {status}"),
    }
}

/// Print the effective configuration and the step catalog.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    println!("openfars dry-run");
    println!();
    println!("{}", toml::to_string_pretty(cfg)?);

    println!("steps ({}):", catalog::len());
    for step in catalog::steps() {
        let runner = if step.executor_enabled { "executor" } else { "built-in" };
        println!("  {}. {} ({}) [{runner}]", step.number, step.title, step.key);
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
