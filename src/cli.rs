// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::loader::default_pipeline_path;

/// Command-line arguments for `stepgraph`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "stepgraph",
    version,
    about = "Run a pipeline of external steps in dependency order, resuming where the last run stopped.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    #[arg(long, value_name = "PATH", default_value_os_t = default_pipeline_path())]
    pub pipeline: PathBuf,

    /// Working directory for step artifacts and run state.
    ///
    /// Overrides `[pipeline].working_dir`.
    #[arg(long, value_name = "PATH")]
    pub workdir: Option<String>,

    /// Maximum number of steps running at once. Overrides `[pipeline].jobs`.
    #[arg(long, short = 'j', value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Override or add a parameter, e.g. `--set threshold=7`. Repeatable.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, String)>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `STEPGRAPH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse, validate and print the resolved steps without executing them.
    #[arg(long, conflicts_with_all = ["status", "reset"])]
    pub dry_run: bool,

    /// Print the persisted status of every declared step and exit.
    #[arg(long, conflicts_with = "reset")]
    pub status: bool,

    /// Discard every persisted step status before running.
    #[arg(long)]
    pub reset: bool,
}

impl CliArgs {
    /// `--set` overrides as borrowed pairs.
    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.set.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
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

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
