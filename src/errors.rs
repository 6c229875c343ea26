// src/errors.rs

//! Crate-wide error types.
//!
//! - [`StepgraphError`] is returned from fallible APIs (config loading, graph
//!   declaration, status persistence).
//! - [`GraphError`] covers malformed step declarations.
//! - [`StepFailure`] describes why a single step failed. It is carried inside
//!   run results and status records rather than returned as an `Err`, since a
//!   failed step does not abort the run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::StepId;

#[derive(Error, Debug)]
pub enum StepgraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Persistence failure in the status store. Always fatal for a run.
    #[error("Status store I/O error at {path:?}: {source}")]
    StatusStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepgraphError {
    pub fn status_store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepgraphError::StatusStore {
            path: path.into(),
            source,
        }
    }
}

/// Malformed step graph declaration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("step id must not be empty")]
    EmptyId,

    #[error("step '{0}' is declared more than once")]
    DuplicateStep(StepId),

    #[error("step '{step}' cannot depend on itself")]
    SelfReference { step: StepId },

    #[error("step '{step}' depends on '{prerequisite}', which is declared later")]
    ForwardReference { step: StepId, prerequisite: StepId },

    #[error("step '{step}' depends on unknown step '{prerequisite}'")]
    UnknownPrerequisite { step: StepId, prerequisite: StepId },

    #[error("cycle detected in step graph involving '{0}'")]
    Cycle(StepId),
}

/// Why a step ended `Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    /// The external process exited with a nonzero code (or was killed by a
    /// signal, reported as `-1`).
    #[error("process exited with code {exit_code}")]
    ProcessFailure { exit_code: i32 },

    /// The process exited successfully but a declared output is absent.
    #[error("exited successfully but expected output {path:?} is missing")]
    MissingOutput { path: PathBuf },

    /// The program could not be started at all.
    #[error("failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    /// A built-in operation (mkdir, copy, symlink) failed.
    #[error("internal operation failed: {message}")]
    Internal { message: String },
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, StepgraphError>;
