// src/engine/mod.rs

//! Orchestration engine for stepgraph.
//!
//! This module ties together:
//! - the step scheduler (`dag::Scheduler`)
//! - the status store (what is already done, what changed)
//! - the runtime event loop that reacts to:
//!   - step completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`coordinator`] is the public entry point
//! that reconciles persisted state ([`resume`]) before running.

use crate::errors::StepFailure;
use crate::exec::CapturedOutput;
use crate::types::StepId;

/// Outcome of a step for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(StepFailure),
}

/// Events flowing into the runtime from executors and signal handlers.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched step finished.
    StepCompleted {
        step: StepId,
        outcome: StepOutcome,
        output: CapturedOutput,
    },
    /// Cooperative cancellation requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod coordinator;
pub mod core;
pub mod event_handlers;
pub mod result;
pub mod resume;
pub mod runtime;

pub use coordinator::{Coordinator, CoordinatorOptions};
pub use self::core::CoreCoordinator;
pub use event_handlers::{CoreCommand, CoreStep};
pub use result::{FailedStep, RunEvent, RunResult, Transition};
pub use resume::{reconcile, Reconciliation};
pub use runtime::{Runtime, RuntimeReport};
