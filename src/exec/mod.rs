// src/exec/mod.rs

//! Step execution layer.
//!
//! This module runs scheduled steps, external programs via
//! `tokio::process::Command` and built-in operations via `tokio::fs`, and
//! reports each outcome back to the coordinator as a `RuntimeEvent`.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `RealExecutorBackend`; tests substitute a fake.
//! - [`executor_loop`] owns the background loop that spawns one task per step.
//! - [`step_runner`] executes a single step and verifies its outputs.
//! - [`command`] builds process invocations (program + argument tokens).
//! - [`internal`] implements `mkdir`, `copy` and `symlink`.
//! - [`capture`] keeps the tail of a process's stdout/stderr.

use std::path::{Path, PathBuf};

pub mod backend;
pub mod capture;
pub mod command;
pub mod executor_loop;
pub mod internal;
pub mod step_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use capture::{CapturedOutput, TailBuffer, TAIL_LINES};
pub use executor_loop::spawn_executor;
pub use step_runner::{execute, ExecutionReport};

/// Resolve a step path against the working directory.
pub fn resolve_in(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// First declared output that does not exist under `working_dir`, as declared.
pub fn first_missing_output(outputs: &[PathBuf], working_dir: &Path) -> Option<PathBuf> {
    outputs
        .iter()
        .find(|p| !resolve_in(working_dir, p).exists())
        .cloned()
}
