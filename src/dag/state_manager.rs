// src/dag/state_manager.rs

//! Per-run state transitions for steps in the scheduler.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, warn};

use crate::dag::graph::StepGraph;
use crate::dag::scheduler_step::StatusChange;
use crate::errors::StepFailure;
use crate::types::{StepId, StepStatus};

/// Applies status transitions and records each one as a [`StatusChange`].
pub struct StateManager<'a> {
    graph: &'a StepGraph,
    states: &'a mut [StepStatus],
    changes: &'a mut Vec<StatusChange>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a StepGraph,
        states: &'a mut [StepStatus],
        changes: &'a mut Vec<StatusChange>,
    ) -> Self {
        Self {
            graph,
            states,
            changes,
        }
    }

    /// Move step `index` to `to`, recording the change.
    ///
    /// Illegal transitions are refused (and logged); the return value says
    /// whether the transition happened.
    pub fn transition(&mut self, index: usize, to: StepStatus, failure: Option<StepFailure>) -> bool {
        let from = self.states[index];
        let step = &self.graph.steps()[index];

        if !from.can_transition_to(to) {
            warn!(step = %step.id, %from, %to, "refusing illegal status transition");
            return false;
        }

        self.states[index] = to;
        debug!(step = %step.id, %from, %to, "status transition");
        self.changes.push(StatusChange {
            step: step.id.clone(),
            index,
            from,
            to,
            fingerprint: step.fingerprint.clone(),
            failure,
        });
        true
    }

    /// Promote every `Pending` step whose prerequisites are all `Done` to
    /// `Ready`. Returns the promoted indices in declaration order.
    pub fn promote_ready(&mut self) -> Vec<usize> {
        let candidates: Vec<usize> = (0..self.states.len())
            .filter(|&i| self.states[i] == StepStatus::Pending)
            .filter(|&i| ReadOnlyStateManager::new(self.graph, &*self.states).deps_satisfied(i))
            .collect();

        for &i in &candidates {
            self.transition(i, StepStatus::Ready, None);
        }
        candidates
    }

    /// Mark every transitive dependent of `failed` that has not started yet
    /// as `Blocked`.
    ///
    /// Returns the newly blocked step ids in declaration order.
    pub fn block_dependents(&mut self, failed: usize) -> Vec<StepId> {
        let mut queue: VecDeque<usize> = self.graph.dependents_at(failed).iter().copied().collect();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut to_block = Vec::new();

        while let Some(i) = queue.pop_front() {
            if !visited.insert(i) {
                continue;
            }
            if matches!(self.states[i], StepStatus::Pending | StepStatus::Ready) {
                to_block.push(i);
            }
            queue.extend(self.graph.dependents_at(i).iter().copied());
        }

        to_block.sort_unstable();
        let mut blocked = Vec::with_capacity(to_block.len());
        for i in to_block {
            if self.transition(i, StepStatus::Blocked, None) {
                blocked.push(self.graph.steps()[i].id.clone());
            }
        }
        blocked
    }
}

/// A read-only view used for dependency checks.
pub struct ReadOnlyStateManager<'a> {
    graph: &'a StepGraph,
    states: &'a [StepStatus],
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(graph: &'a StepGraph, states: &'a [StepStatus]) -> Self {
        Self { graph, states }
    }

    /// A step is ready to run iff every prerequisite is `Done`.
    pub fn deps_satisfied(&self, index: usize) -> bool {
        self.graph
            .prerequisite_indices(index)
            .all(|p| self.states[p] == StepStatus::Done)
    }

    /// Ready step indices in declaration order.
    pub fn ready(&self) -> Vec<usize> {
        (0..self.states.len())
            .filter(|&i| self.states[i] == StepStatus::Ready)
            .collect()
    }
}
