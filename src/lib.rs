// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{load_from_path, resolve_working_dir};
use crate::config::model::PipelineFile;
use crate::dag::Run;
use crate::engine::{Coordinator, CoordinatorOptions, RuntimeEvent};
use crate::exec::RealExecutorBackend;
use crate::store::{FileStatusStore, StatusStore};
use crate::types::StepStatus;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading, `--set` overrides and validation
/// - step declaration into a [`Run`]
/// - the status store under the working directory
/// - coordinator + real executor
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let pipeline_path = args.pipeline.clone();
    let mut raw = load_from_path(&pipeline_path)
        .with_context(|| format!("loading pipeline {}", pipeline_path.display()))?;
    raw.apply_overrides(args.overrides());
    if let Some(jobs) = args.jobs {
        raw.pipeline.jobs = jobs as usize;
    }
    let cfg = PipelineFile::try_from(raw)?;

    let working_dir = match &args.workdir {
        Some(dir) => PathBuf::from(dir),
        None => resolve_working_dir(&pipeline_path, &cfg.pipeline.working_dir),
    };
    let working_dir = std::path::absolute(&working_dir)
        .with_context(|| format!("resolving working directory {}", working_dir.display()))?;

    let run = Run::from_config(&cfg, &working_dir)?;
    info!(
        pipeline = cfg.name(),
        steps = run.graph.len(),
        working_dir = ?working_dir,
        "pipeline declared"
    );

    if args.dry_run {
        print_dry_run(&cfg, &run);
        return Ok(ExitCode::SUCCESS);
    }

    let mut store = FileStatusStore::new(&working_dir);

    if args.status {
        print_status(&run, &store)?;
        return Ok(ExitCode::SUCCESS);
    }

    if args.reset {
        store.invalidate()?;
        info!("status store reset; every step will run again");
    }

    std::fs::create_dir_all(&working_dir)
        .with_context(|| format!("creating working directory {}", working_dir.display()))?;
    store.backup_pipeline(&pipeline_path)?;

    let mut coordinator = Coordinator::new(
        store,
        CoordinatorOptions {
            concurrency: cfg.pipeline.jobs,
        },
    );

    let wd = working_dir.clone();
    let result = coordinator
        .run_with(&run, move |tx| {
            listen_for_ctrl_c(tx.clone());
            RealExecutorBackend::new(tx, wd)
        })
        .await?;

    print!("{result}");

    Ok(if result.is_complete() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Ctrl-C → cooperative cancellation.
fn listen_for_ctrl_c(tx: mpsc::Sender<RuntimeEvent>) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; waiting for running steps to finish");
        let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
    });
}

/// Print the resolved pipeline: steps, kinds, prerequisites, command lines.
fn print_dry_run(cfg: &PipelineFile, run: &Run) {
    println!("stepgraph dry-run: {}", cfg.name());
    println!("  working_dir = {}", run.working_dir.display());
    println!("  jobs = {}", cfg.pipeline.jobs);
    if !run.parameters.is_empty() {
        println!("  params:");
        for (name, value) in run.parameters.iter() {
            println!("    {name} = {value}");
        }
    }
    println!();

    println!("steps ({}):", run.graph.len());
    for step in run.graph.steps() {
        println!("  - {} [{}]", step.id, step.operation.tag());
        if !step.is_barrier() {
            println!("      run: {}", step.operation.display_line());
        }
        if !step.prerequisites.is_empty() {
            println!("      after: {}", step.prerequisites.join(", "));
        }
        if !step.outputs.is_empty() {
            let outputs: Vec<_> = step.outputs.iter().map(|p| p.display().to_string()).collect();
            println!("      outputs: {}", outputs.join(", "));
        }
    }

    debug!("dry-run complete (no execution)");
}

/// Print every declared step with its persisted status.
fn print_status(run: &Run, store: &FileStatusStore) -> Result<()> {
    let prior = store.load_prior_status()?;
    let drifted = match store.load_snapshot()? {
        Some(snapshot) => !snapshot.diff(&run.parameters).is_empty(),
        None => !prior.is_empty(),
    };

    println!("status of {} ({} steps):", run.working_dir.display(), run.graph.len());
    if drifted {
        println!("  (parameters changed since the last run; every step will run again)");
    }

    for step in run.graph.steps() {
        match prior.get(&step.id) {
            Some(record) => {
                let stale = if record.fingerprint != step.fingerprint {
                    "  (changed since recorded)"
                } else {
                    ""
                };
                println!(
                    "  {:<8} {}  {}{}",
                    record.status.as_str(),
                    step.id,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    stale
                );
                if let Some(error) = &record.error {
                    println!("           {error}");
                }
            }
            None => println!("  {:<8} {}", StepStatus::Pending.as_str(), step.id),
        }
    }

    Ok(())
}

