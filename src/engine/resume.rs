// src/engine/resume.rs

//! Reconcile persisted step records with the declared graph.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{debug, info};

use crate::dag::StepGraph;
use crate::engine::result::RunEvent;
use crate::exec::first_missing_output;
use crate::store::StoredStatus;
use crate::types::{StepId, StepStatus};

/// What a new invocation starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Steps restored as `Done`, in declaration order. Closed under
    /// prerequisites.
    pub done: Vec<StepId>,
    /// Steps whose stored record must be rewritten as `Pending`.
    pub reset: Vec<StepId>,
    pub events: Vec<RunEvent>,
}

/// Decide which stored statuses still hold.
///
/// A stored `Done` is honoured only if its fingerprint equals the declared
/// one, every expected output exists under `working_dir`, and every
/// prerequisite is honoured too. Every other stored status is re-attempted.
/// Records for ids that are no longer declared are ignored.
pub fn reconcile(
    graph: &StepGraph,
    prior: &HashMap<StepId, StoredStatus>,
    working_dir: &Path,
) -> Reconciliation {
    let mut out = Reconciliation::default();
    let mut done: HashSet<&str> = HashSet::new();

    // Declaration order is topological, so prerequisites are settled first.
    for step in graph.steps() {
        let Some(record) = prior.get(&step.id) else {
            continue;
        };

        if record.status != StepStatus::Done {
            if record.status != StepStatus::Pending {
                debug!(step = %step.id, status = %record.status, "stored status will be re-attempted");
                out.reset.push(step.id.clone());
            }
            continue;
        }

        if record.fingerprint != step.fingerprint {
            info!(step = %step.id, "step changed since it was completed; re-running");
            out.events.push(RunEvent::FingerprintChanged {
                step: step.id.clone(),
            });
            out.reset.push(step.id.clone());
            continue;
        }

        if let Some(path) = first_missing_output(&step.outputs, working_dir) {
            info!(step = %step.id, path = ?path, "expected output missing; re-running");
            out.events.push(RunEvent::OutputMissing {
                step: step.id.clone(),
                path,
            });
            out.reset.push(step.id.clone());
            continue;
        }

        if let Some(prereq) = step
            .prerequisites
            .iter()
            .find(|p| !done.contains(p.as_str()))
        {
            debug!(step = %step.id, prerequisite = %prereq, "prerequisite must re-run; discarding stored done");
            out.events.push(RunEvent::DependentInvalidated {
                step: step.id.clone(),
                prerequisite: prereq.clone(),
            });
            out.reset.push(step.id.clone());
            continue;
        }

        done.insert(step.id.as_str());
        out.done.push(step.id.clone());
    }

    let ignored = prior.keys().filter(|id| !graph.contains(id)).count();
    if ignored > 0 {
        debug!(ignored, "ignoring status records of steps that are no longer declared");
    }

    out
}
