// src/engine/coordinator.rs

//! Public entry point: reconcile persisted state, then drive a run.

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::{Run, Scheduler};
use crate::engine::core::CoreCoordinator;
use crate::engine::result::{FailedStep, RunEvent, RunResult};
use crate::engine::resume::reconcile;
use crate::engine::runtime::{Runtime, RuntimeReport};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::{ExecutorBackend, RealExecutorBackend};
use crate::store::{SnapshotCheck, StatusStore};
use crate::types::{RunStatus, StepStatus};

/// Capacity of the runtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct CoordinatorOptions {
    /// Maximum number of steps running at once (at least 1).
    pub concurrency: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Runs declared pipelines against a status store.
#[derive(Debug)]
pub struct Coordinator<S: StatusStore> {
    store: S,
    options: CoordinatorOptions,
}

impl<S: StatusStore> Coordinator<S> {
    pub fn new(store: S, options: CoordinatorOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run with real processes in the run's working directory.
    pub async fn run(&mut self, run: &Run) -> Result<RunResult> {
        let working_dir = run.working_dir.clone();
        self.run_with(run, move |tx| RealExecutorBackend::new(tx, working_dir))
            .await
    }

    /// Run with a custom executor.
    ///
    /// `make_executor` receives the sender of the runtime event channel; the
    /// executor reports completions on it, and anything else holding a clone
    /// (a Ctrl-C listener) may send `RuntimeEvent::ShutdownRequested`.
    pub async fn run_with<E, F>(&mut self, run: &Run, make_executor: F) -> Result<RunResult>
    where
        E: ExecutorBackend,
        F: FnOnce(mpsc::Sender<RuntimeEvent>) -> E,
    {
        let mut events = Vec::new();

        match self.store.check_parameters(&run.parameters)? {
            SnapshotCheck::Drifted(diff) => {
                events.push(RunEvent::ParameterDriftInvalidation {
                    parameters: diff.names().into_iter().map(str::to_string).collect(),
                });
            }
            SnapshotCheck::Unverified { discarded } => {
                events.push(RunEvent::UnverifiedRecordsInvalidated { records: discarded });
            }
            SnapshotCheck::FirstRun => info!("no parameter snapshot found; starting fresh"),
            SnapshotCheck::Unchanged => {}
        }

        let prior = self.store.load_prior_status()?;
        let reconciliation = reconcile(&run.graph, &prior, &run.working_dir);

        for id in &reconciliation.reset {
            if let Some(step) = run.graph.get(id) {
                self.store
                    .record_step_status(id, StepStatus::Pending, &step.fingerprint, None)?;
            }
        }
        events.extend(reconciliation.events);

        if !reconciliation.done.is_empty() {
            info!(
                skipped = reconciliation.done.len(),
                "restoring steps completed by a previous run"
            );
        }

        let mut scheduler = Scheduler::new(run.graph.clone(), self.options.concurrency);
        scheduler.seed_done(&reconciliation.done);

        let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);
        let executor = make_executor(tx);

        let runtime = Runtime::new(CoreCoordinator::new(scheduler), rx, executor, &mut self.store);
        let report = runtime.run().await?;

        let result = build_result(report, reconciliation.done, events);
        match result.status {
            RunStatus::Complete => info!(
                run_status = %result.status,
                executed = result.executed.len(),
                skipped = result.skipped.len(),
                "run finished"
            ),
            _ => warn!(
                run_status = %result.status,
                failed = ?result.failed_ids(),
                blocked = result.blocked.len(),
                pending = result.pending.len(),
                "run finished"
            ),
        }
        Ok(result)
    }
}

fn build_result(report: RuntimeReport, skipped: Vec<String>, mut events: Vec<RunEvent>) -> RunResult {
    let RuntimeReport {
        scheduler,
        transitions,
        dispatched,
        mut outputs,
        events: runtime_events,
    } = report;

    let failed = scheduler
        .failures()
        .map(|(id, failure)| FailedStep {
            id: id.to_string(),
            failure: failure.clone(),
            output: outputs.remove(id).unwrap_or_default(),
        })
        .collect();

    let pending = scheduler
        .graph()
        .steps()
        .iter()
        .filter(|s| {
            scheduler
                .status_of(&s.id)
                .is_some_and(|status| !status.is_terminal())
        })
        .map(|s| s.id.clone())
        .collect();

    events.extend(runtime_events);

    RunResult {
        status: scheduler.run_status(),
        executed: dispatched,
        skipped,
        failed,
        blocked: scheduler.steps_with(StepStatus::Blocked),
        pending,
        events,
        transitions,
    }
}
