// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::step::ScheduledStep;
use crate::errors::StepFailure;
use crate::types::{StepId, StepStatus};

/// A single status transition decided by the scheduler.
///
/// The IO shell persists every change, in order, before acting on the
/// dispatch list of the same [`SchedulerStep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub step: StepId,
    pub index: usize,
    pub from: StepStatus,
    pub to: StepStatus,
    pub fingerprint: String,
    pub failure: Option<StepFailure>,
}

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the DAG and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Status transitions, in the order they happened.
    pub changes: Vec<StatusChange>,
    /// Steps to hand to the executor now, in declaration order.
    pub dispatch: Vec<ScheduledStep>,
    /// Steps newly marked `Blocked` in this step.
    pub newly_blocked: Vec<StepId>,
    /// Whether no further progress is possible (nothing ready, nothing in
    /// flight).
    pub run_finished: bool,
}

impl SchedulerStep {
    /// Ids of the dispatched steps, for assertions.
    pub fn dispatched_ids(&self) -> Vec<&str> {
        self.dispatch.iter().map(|s| s.id.as_str()).collect()
    }

    /// Ids that reached `status` in this step.
    pub fn reached(&self, status: StepStatus) -> Vec<&str> {
        self.changes
            .iter()
            .filter(|c| c.to == status)
            .map(|c| c.step.as_str())
            .collect()
    }
}
