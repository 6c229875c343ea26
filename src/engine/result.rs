// src/engine/result.rs

//! Structured outcome of a run.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::StepFailure;
use crate::exec::CapturedOutput;
use crate::types::{RunStatus, StepId, StepStatus};

/// Informational events raised while preparing or driving a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// The parameter snapshot changed; every stored status was discarded.
    ParameterDriftInvalidation { parameters: Vec<String> },
    /// Stored statuses existed without a parameter snapshot and were
    /// discarded.
    UnverifiedRecordsInvalidated { records: usize },
    /// A stored `Done` no longer matches the declared step.
    FingerprintChanged { step: StepId },
    /// A stored `Done` lost one of its expected outputs.
    OutputMissing { step: StepId, path: PathBuf },
    /// A stored `Done` was discarded because a prerequisite must re-run.
    DependentInvalidated { step: StepId, prerequisite: StepId },
    /// Cancellation was requested; in-flight steps were allowed to finish.
    CancelRequested,
}

/// One entry of the in-order status change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub seq: u64,
    pub step: StepId,
    pub status: StepStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStep {
    pub id: StepId,
    pub failure: StepFailure,
    pub output: CapturedOutput,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: RunStatus,
    /// Steps handed to the executor, in dispatch order.
    pub executed: Vec<StepId>,
    /// Steps restored as `Done` from a previous invocation.
    pub skipped: Vec<StepId>,
    pub failed: Vec<FailedStep>,
    pub blocked: Vec<StepId>,
    /// Steps that never reached a terminal state (cancelled runs).
    pub pending: Vec<StepId>,
    pub events: Vec<RunEvent>,
    pub transitions: Vec<Transition>,
}

impl RunResult {
    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.id.as_str()).collect()
    }

    pub fn failure_of(&self, id: &str) -> Option<&StepFailure> {
        self.failed.iter().find(|f| f.id == id).map(|f| &f.failure)
    }

    /// Sequence number at which `step` reached `status`, if it did.
    pub fn seq_of(&self, step: &str, status: StepStatus) -> Option<u64> {
        self.transitions
            .iter()
            .find(|t| t.step == step && t.status == status)
            .map(|t| t.seq)
    }

    /// Statuses `step` went through during this run, in order.
    pub fn history_of(&self, step: &str) -> Vec<StepStatus> {
        self.transitions
            .iter()
            .filter(|t| t.step == step)
            .map(|t| t.status)
            .collect()
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}", self.status)?;
        writeln!(f, "  executed: {}", self.executed.len())?;
        writeln!(f, "  skipped:  {}", self.skipped.len())?;
        if !self.failed.is_empty() {
            writeln!(f, "  failed:")?;
            for failed in &self.failed {
                writeln!(f, "    - {}: {}", failed.id, failed.failure)?;
                for line in failed.output.stderr.iter().rev().take(5).rev() {
                    writeln!(f, "        | {line}")?;
                }
            }
        }
        if !self.blocked.is_empty() {
            writeln!(f, "  blocked:  {}", self.blocked.join(", "))?;
        }
        if !self.pending.is_empty() {
            writeln!(f, "  pending:  {}", self.pending.join(", "))?;
        }
        Ok(())
    }
}
