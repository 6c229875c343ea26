// src/dag/mod.rs

//! Step graph representation and scheduling.
//!
//! - [`step`] holds step descriptors and the typed operations they perform.
//! - [`graph`] is the insertion-ordered step graph and its declaration API.
//! - [`run`] ties a graph to a working directory and parameter snapshot.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   steps are ready, which to dispatch, and which are blocked by failures.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies and records individual status transitions.

pub mod graph;
pub mod run;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod step;

pub use graph::StepGraph;
pub use run::Run;
pub use scheduler::Scheduler;
pub use scheduler_step::{SchedulerStep, StatusChange};
pub use step::{Operation, ScheduledStep, Step, StepDecl};
