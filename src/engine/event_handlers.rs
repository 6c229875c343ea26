// src/engine/event_handlers.rs

//! Event handling logic for the core coordinator.

use crate::dag::{ScheduledStep, Scheduler, SchedulerStep, StatusChange};
use crate::engine::StepOutcome;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these steps to the executor.
    DispatchSteps(Vec<ScheduledStep>),
    /// Nothing is ready and nothing is in flight; the run is over.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Status transitions to persist, in order, *before* any command runs.
    pub changes: Vec<StatusChange>,
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    /// Steps dispatched by this step's commands.
    pub fn dispatched(&self) -> impl Iterator<Item = &ScheduledStep> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchSteps(steps) => Some(steps),
                CoreCommand::RequestExit => None,
            })
            .flatten()
    }
}

impl From<SchedulerStep> for CoreStep {
    fn from(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.dispatch.is_empty() {
            commands.push(CoreCommand::DispatchSteps(step.dispatch));
        }
        if step.run_finished {
            commands.push(CoreCommand::RequestExit);
        }
        CoreStep {
            changes: step.changes,
            commands,
            keep_running: !step.run_finished,
        }
    }
}

/// Promote initially ready steps and dispatch the first batch.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.start().into()
}

/// Handle a step completion event.
pub fn handle_step_completion(
    scheduler: &mut Scheduler,
    step: &str,
    outcome: StepOutcome,
) -> CoreStep {
    scheduler.step_completion(step, outcome).into()
}

/// Handle a shutdown request: stop dispatching, keep waiting for in-flight
/// steps.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    scheduler.cancel().into()
}
