use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::dag::graph::StepGraph;
use crate::dag::scheduler_step::{SchedulerStep, StatusChange};
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::step::ScheduledStep;
use crate::engine::StepOutcome;
use crate::errors::StepFailure;
use crate::types::{RunStatus, StepId, StepStatus};

/// Scheduler holds the immutable step graph plus mutable per-run state.
///
/// It is responsible for:
/// - promoting steps to `Ready` once every prerequisite is `Done`
/// - choosing which ready steps to dispatch (declaration order, bounded by
///   the concurrency limit)
/// - completing barrier steps as soon as they become ready
/// - marking steps as done/failed and blocking dependents of failures
///
/// It performs no IO; every decision is reported back as a [`SchedulerStep`].
#[derive(Debug)]
pub struct Scheduler {
    graph: StepGraph,
    states: Vec<StepStatus>,
    concurrency: usize,
    running: usize,
    cancelled: bool,
    /// Why each failed step failed, by declaration index.
    failures: BTreeMap<usize, StepFailure>,
}

impl Scheduler {
    /// Construct a scheduler with every step `Pending`.
    ///
    /// A concurrency of `0` is treated as `1`.
    pub fn new(graph: StepGraph, concurrency: usize) -> Self {
        let states = vec![StepStatus::Pending; graph.len()];
        Self {
            graph,
            states,
            concurrency: concurrency.max(1),
            running: 0,
            cancelled: false,
            failures: BTreeMap::new(),
        }
    }

    /// Restore steps completed by a previous invocation.
    ///
    /// Seeding is initialisation, not a transition: seeded steps are never
    /// dispatched and produce no [`StatusChange`]. Unknown ids are ignored.
    pub fn seed_done<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for id in ids {
            match self.graph.position(id.as_ref()) {
                Some(i) => {
                    self.states[i] = StepStatus::Done;
                    debug!(step = %id.as_ref(), "restored as Done from previous run");
                }
                None => warn!(step = %id.as_ref(), "cannot seed unknown step; ignoring"),
            }
        }
    }

    pub fn graph(&self) -> &StepGraph {
        &self.graph
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of steps currently dispatched and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.running
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.graph.position(id).map(|i| self.states[i])
    }

    pub fn failure_of(&self, id: &str) -> Option<&StepFailure> {
        self.graph.position(id).and_then(|i| self.failures.get(&i))
    }

    /// Failed steps with their failures, in declaration order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &StepFailure)> {
        self.failures
            .iter()
            .map(|(&i, failure)| (self.graph.steps()[i].id.as_str(), failure))
    }

    /// Whether every prerequisite of `id` is `Done`. `None` for unknown ids.
    pub fn deps_satisfied(&self, id: &str) -> Option<bool> {
        let i = self.graph.position(id)?;
        Some(ReadOnlyStateManager::new(&self.graph, &self.states).deps_satisfied(i))
    }

    /// Ids currently in `status`, in declaration order.
    pub fn steps_with(&self, status: StepStatus) -> Vec<StepId> {
        self.graph
            .steps()
            .iter()
            .zip(self.states.iter())
            .filter(|(_, s)| **s == status)
            .map(|(step, _)| step.id.clone())
            .collect()
    }

    /// No step is ready to start and nothing is in flight (or the run was
    /// cancelled and in-flight steps have drained).
    pub fn is_finished(&self) -> bool {
        if self.running > 0 {
            return false;
        }
        self.cancelled || ReadOnlyStateManager::new(&self.graph, &self.states).ready().is_empty()
    }

    pub fn run_status(&self) -> RunStatus {
        if self.states.iter().all(|s| *s == StepStatus::Done) {
            RunStatus::Complete
        } else if self.states.iter().any(|s| *s == StepStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Incomplete
        }
    }

    /// Begin scheduling: promote initially ready steps and dispatch the first
    /// batch.
    pub fn start(&mut self) -> SchedulerStep {
        let mut changes = Vec::new();
        StateManager::new(&self.graph, &mut self.states, &mut changes).promote_ready();
        let dispatch = self.dispatch_ready(&mut changes);
        self.finish_step(changes, dispatch, Vec::new())
    }

    /// Handle completion of a dispatched step.
    pub fn step_completion(&mut self, id: &str, outcome: StepOutcome) -> SchedulerStep {
        let mut changes = Vec::new();
        let mut newly_blocked = Vec::new();

        let Some(index) = self.graph.position(id) else {
            warn!(step = %id, "completion for unknown step; ignoring");
            return self.finish_step(changes, Vec::new(), newly_blocked);
        };

        if self.states[index] != StepStatus::Running {
            warn!(
                step = %id,
                status = %self.states[index],
                "completion for step that is not running; ignoring"
            );
            return self.finish_step(changes, Vec::new(), newly_blocked);
        }

        self.running -= 1;

        {
            let mut manager = StateManager::new(&self.graph, &mut self.states, &mut changes);
            match outcome {
                StepOutcome::Success => {
                    manager.transition(index, StepStatus::Done, None);
                    debug!(step = %id, "step completed successfully");
                    manager.promote_ready();
                }
                StepOutcome::Failed(failure) => {
                    warn!(step = %id, error = %failure, "step failed; blocking dependents");
                    self.failures.insert(index, failure.clone());
                    manager.transition(index, StepStatus::Failed, Some(failure));
                    newly_blocked = manager.block_dependents(index);
                }
            }
        }

        let dispatch = self.dispatch_ready(&mut changes);
        self.finish_step(changes, dispatch, newly_blocked)
    }

    /// Stop dispatching new steps. Steps already running are left to finish.
    pub fn cancel(&mut self) -> SchedulerStep {
        if !self.cancelled {
            info!(in_flight = self.running, "cancellation requested; no further steps will be dispatched");
        }
        self.cancelled = true;
        self.finish_step(Vec::new(), Vec::new(), Vec::new())
    }

    fn finish_step(
        &self,
        changes: Vec<StatusChange>,
        dispatch: Vec<ScheduledStep>,
        newly_blocked: Vec<StepId>,
    ) -> SchedulerStep {
        SchedulerStep {
            changes,
            dispatch,
            newly_blocked,
            run_finished: self.is_finished(),
        }
    }

    /// Complete ready barriers, then fill free slots with ready steps in
    /// declaration order.
    fn dispatch_ready(&mut self, changes: &mut Vec<StatusChange>) -> Vec<ScheduledStep> {
        if self.cancelled {
            return Vec::new();
        }

        // Barriers do no work and take no slot; settle them first so the
        // steps they release compete for slots in declaration order.
        loop {
            let barriers: Vec<usize> = ReadOnlyStateManager::new(&self.graph, &self.states)
                .ready()
                .into_iter()
                .filter(|&i| self.graph.steps()[i].is_barrier())
                .collect();
            if barriers.is_empty() {
                break;
            }

            let mut manager = StateManager::new(&self.graph, &mut self.states, changes);
            for i in barriers {
                manager.transition(i, StepStatus::Running, None);
                manager.transition(i, StepStatus::Done, None);
            }
            manager.promote_ready();
        }

        let free = self.concurrency.saturating_sub(self.running);
        let chosen: Vec<usize> = ReadOnlyStateManager::new(&self.graph, &self.states)
            .ready()
            .into_iter()
            .take(free)
            .collect();

        let mut dispatch = Vec::with_capacity(chosen.len());
        let mut manager = StateManager::new(&self.graph, &mut self.states, changes);
        for i in chosen {
            if manager.transition(i, StepStatus::Running, None) {
                let step = &self.graph.steps()[i];
                info!(step = %step.id, kind = step.operation.tag(), "dispatching step");
                dispatch.push(ScheduledStep::from_step(step));
            }
        }
        self.running += dispatch.len();

        dispatch
    }
}
