// src/engine/core.rs

//! Pure core coordinator state machine.
//!
//! This module contains a synchronous, deterministic "core" that consumes
//! [`RuntimeEvent`]s and produces:
//! - the status changes the IO shell must persist
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels, persisting changes, and handing steps to the
//! executor. The core can be driven in tests without Tokio, channels,
//! filesystem, or processes.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    handle_shutdown, handle_start, handle_step_completion, CoreStep,
};
use crate::engine::RuntimeEvent;
use crate::types::RunStatus;

/// Pure core coordinator state. Owns the scheduler and performs no IO.
#[derive(Debug)]
pub struct CoreCoordinator {
    scheduler: Scheduler,
}

impl CoreCoordinator {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }

    pub fn run_status(&self) -> RunStatus {
        self.scheduler.run_status()
    }

    /// First step of every run.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting changes and commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::StepCompleted { step, outcome, .. } => {
                handle_step_completion(&mut self.scheduler, &step, outcome)
            }
            RuntimeEvent::ShutdownRequested => handle_shutdown(&mut self.scheduler),
        }
    }
}
