// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::dag::step::{Operation, Step, StepDecl};
use crate::errors::GraphError;
use crate::store::fingerprint::fingerprint;
use crate::types::StepId;

/// Insertion-ordered step graph.
///
/// Prerequisites may only reference steps that were declared earlier, so the
/// graph is acyclic by construction and declaration order is always a valid
/// topological order.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    steps: Vec<Step>,
    index: HashMap<StepId, usize>,
    /// Direct dependents of each step, by declaration index.
    dependents: Vec<Vec<usize>>,
}

impl StepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a step from a full [`StepDecl`].
    ///
    /// Steps without an explicit id get `"<index>-<label>"` (e.g.
    /// `"002-xmipp_ctf_estimate"`), which stays stable as long as the pipeline
    /// declares its steps in the same order.
    pub fn declare(&mut self, decl: StepDecl) -> Result<StepId, GraphError> {
        let index = self.steps.len();
        let id = match decl.id {
            Some(id) => id,
            None => format!("{:03}-{}", index, decl.operation.label()),
        };

        if id.trim().is_empty() {
            return Err(GraphError::EmptyId);
        }
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateStep(id));
        }

        let mut prerequisites: Vec<StepId> = Vec::with_capacity(decl.prerequisites.len());
        for prereq in decl.prerequisites {
            if prereq == id {
                return Err(GraphError::SelfReference { step: id });
            }
            if !self.index.contains_key(&prereq) {
                return Err(GraphError::UnknownPrerequisite {
                    step: id,
                    prerequisite: prereq,
                });
            }
            if !prerequisites.contains(&prereq) {
                prerequisites.push(prereq);
            }
        }

        let fp = fingerprint(&decl.operation, &decl.outputs);

        for prereq in &prerequisites {
            let p = self.index[prereq];
            self.dependents[p].push(index);
        }

        debug!(
            step = %id,
            index,
            kind = decl.operation.tag(),
            prerequisites = ?prerequisites,
            "declared step"
        );

        self.steps.push(Step {
            id: id.clone(),
            index,
            operation: decl.operation,
            prerequisites,
            outputs: decl.outputs,
            fingerprint: fp,
        });
        self.dependents.push(Vec::new());
        self.index.insert(id.clone(), index);

        Ok(id)
    }

    /// Declare a step with the given operation and prerequisites.
    pub fn declare_step<I, S>(
        &mut self,
        operation: Operation,
        prerequisites: I,
    ) -> Result<StepId, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.declare(StepDecl::new(operation).after_all(prerequisites))
    }

    /// Declare a barrier depending on every step of `level`.
    ///
    /// Later steps that must wait for the whole level depend on the returned
    /// id instead of enumerating the level.
    pub fn declare_barrier<I, S>(&mut self, level: I) -> Result<StepId, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.declare(StepDecl::new(Operation::Barrier).after_all(level))
    }

    /// Like [`declare_barrier`](Self::declare_barrier) but with an explicit id.
    pub fn declare_named_barrier<I, S>(
        &mut self,
        id: impl Into<StepId>,
        level: I,
    ) -> Result<StepId, GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.declare(StepDecl::new(Operation::Barrier).id(id).after_all(level))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in declaration order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn get(&self, id: &str) -> Option<&Step> {
        self.index.get(id).map(|&i| &self.steps[i])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Immediate prerequisites of a step.
    pub fn dependencies_of(&self, id: &str) -> &[StepId] {
        self.get(id)
            .map(|s| s.prerequisites.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step, in declaration order.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        match self.index.get(id) {
            Some(&i) => self.dependents[i]
                .iter()
                .map(|&d| self.steps[d].id.as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn dependents_at(&self, index: usize) -> &[usize] {
        self.dependents
            .get(index)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn prerequisite_indices(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.steps[index]
            .prerequisites
            .iter()
            .filter_map(|p| self.index.get(p).copied())
    }

    /// Every step that (transitively) depends on `id`, in declaration order.
    pub fn transitive_dependents(&self, id: &str) -> Vec<StepId> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut seen: HashSet<usize> = HashSet::new();
        let mut queue: VecDeque<usize> = self.dependents[start].iter().copied().collect();
        while let Some(i) = queue.pop_front() {
            if seen.insert(i) {
                queue.extend(self.dependents[i].iter().copied());
            }
        }

        let mut found: Vec<usize> = seen.into_iter().collect();
        found.sort_unstable();
        found.into_iter().map(|i| self.steps[i].id.clone()).collect()
    }

    /// Steps without prerequisites.
    pub fn roots(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.prerequisites.is_empty())
    }
}
