// src/types.rs

//! Small shared types used across the graph, store and engine layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical step identifier type used throughout the crate.
pub type StepId = String;

/// Lifecycle state of a single step.
///
/// Legal transitions:
/// `Pending -> Ready -> Running -> {Done, Failed}`, and
/// `{Pending, Ready} -> Blocked` when an upstream step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Declared, waiting for prerequisites.
    Pending,
    /// Every prerequisite is `Done`; waiting for a free slot.
    Ready,
    /// Dispatched to the executor.
    Running,
    /// Finished successfully (or restored from a previous invocation).
    Done,
    /// The step itself failed.
    Failed,
    /// Never dispatched because an upstream step failed.
    Blocked,
}

impl StepStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Failed | StepStatus::Blocked)
    }

    /// Whether moving from `self` to `next` respects the step lifecycle.
    pub fn can_transition_to(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Blocked)
                | (Ready, Running)
                | (Ready, Blocked)
                | (Running, Done)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
            StepStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(StepStatus::Pending),
            "ready" => Ok(StepStatus::Ready),
            "running" => Ok(StepStatus::Running),
            "done" => Ok(StepStatus::Done),
            "failed" => Ok(StepStatus::Failed),
            "blocked" => Ok(StepStatus::Blocked),
            other => Err(format!("invalid step status: {other}")),
        }
    }
}

/// Aggregate status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Stopped before every step reached a terminal state (cancellation).
    Incomplete,
    /// Every declared step is `Done`.
    Complete,
    /// At least one step failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Incomplete => "incomplete",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
