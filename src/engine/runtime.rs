// src/engine/runtime.rs

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{ScheduledStep, Scheduler, StatusChange};
use crate::errors::Result;
use crate::exec::{CapturedOutput, ExecutorBackend};
use crate::store::StatusStore;
use crate::types::StepId;

use super::core::CoreCoordinator;
use super::result::{RunEvent, Transition};
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// Everything the shell observed while driving a run.
#[derive(Debug)]
pub struct RuntimeReport {
    /// Final scheduler state.
    pub scheduler: Scheduler,
    pub transitions: Vec<Transition>,
    /// Steps handed to the executor, in dispatch order.
    pub dispatched: Vec<StepId>,
    /// Captured output of every completed step.
    pub outputs: HashMap<StepId, CapturedOutput>,
    pub events: Vec<RunEvent>,
}

/// Drives the core coordinator in response to `RuntimeEvent`s, persists
/// every status change, and delegates step execution to an
/// `ExecutorBackend`.
///
/// Every change of a core step is durably recorded before any of its
/// commands is executed. A store failure halts the loop immediately.
pub struct Runtime<'s, S: StatusStore, E: ExecutorBackend> {
    core: CoreCoordinator,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    store: &'s mut S,
    seq: u64,
    transitions: Vec<Transition>,
    dispatched: Vec<StepId>,
    outputs: HashMap<StepId, CapturedOutput>,
    events: Vec<RunEvent>,
}

impl<S: StatusStore, E: ExecutorBackend> fmt::Debug for Runtime<'_, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("seq", &self.seq)
            .finish_non_exhaustive()
    }
}

impl<'s, S: StatusStore, E: ExecutorBackend> Runtime<'s, S, E> {
    pub fn new(
        core: CoreCoordinator,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        store: &'s mut S,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            store,
            seq: 0,
            transitions: Vec::new(),
            dispatched: Vec::new(),
            outputs: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Starts the core and applies its first step.
    /// - Consumes `RuntimeEvent`s from `event_rx` until the core reports that
    ///   nothing is ready and nothing is in flight.
    pub async fn run(mut self) -> Result<RuntimeReport> {
        info!(
            steps = self.core.scheduler().graph().len(),
            concurrency = self.core.scheduler().concurrency(),
            "stepgraph runtime started"
        );

        let first = self.core.start();
        let mut keep_running = self.apply(first).await?;

        while keep_running {
            let Some(event) = self.event_rx.recv().await else {
                warn!(
                    in_flight = self.core.scheduler().in_flight(),
                    "runtime event channel closed; exiting"
                );
                break;
            };

            debug!(?event, "runtime received event");

            match &event {
                RuntimeEvent::StepCompleted { step, output, .. } => {
                    self.outputs.insert(step.clone(), output.clone());
                }
                RuntimeEvent::ShutdownRequested => {
                    if !self.core.scheduler().is_cancelled() {
                        self.events.push(RunEvent::CancelRequested);
                    }
                }
            }

            let step = self.core.step(event);
            keep_running = self.apply(step).await?;
        }

        info!(run_status = %self.core.run_status(), "runtime exiting");

        Ok(RuntimeReport {
            scheduler: self.core.into_scheduler(),
            transitions: self.transitions,
            dispatched: self.dispatched,
            outputs: self.outputs,
            events: self.events,
        })
    }

    /// Persist the changes of a core step, then execute its commands.
    async fn apply(&mut self, step: CoreStep) -> Result<bool> {
        self.persist(&step.changes)?;

        for command in step.commands {
            self.execute_command(command).await?;
        }

        Ok(step.keep_running)
    }

    fn persist(&mut self, changes: &[StatusChange]) -> Result<()> {
        for change in changes {
            if let Err(e) = self.store.record_step_status(
                &change.step,
                change.to,
                &change.fingerprint,
                change.failure.as_ref(),
            ) {
                error!(
                    step = %change.step,
                    status = %change.to,
                    error = %e,
                    "failed to persist step status; halting"
                );
                return Err(e);
            }

            self.seq += 1;
            self.transitions.push(Transition {
                seq: self.seq,
                step: change.step.clone(),
                status: change.to,
                at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchSteps(steps) => self.spawn_ready(steps).await,
            CoreCommand::RequestExit => {
                debug!("core reports the run is finished");
                Ok(())
            }
        }
    }

    async fn spawn_ready(&mut self, steps: Vec<ScheduledStep>) -> Result<()> {
        if steps.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = steps.iter().map(|s| s.id.as_str()).collect();
        debug!(?ids, "dispatching ready steps");
        self.dispatched.extend(steps.iter().map(|s| s.id.clone()));

        self.executor.spawn_ready_steps(steps).await
    }
}
