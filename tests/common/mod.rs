#![allow(dead_code)]

pub use stepgraph_test_utils::*;

use stepgraph::dag::{Operation, Run, StepDecl};
use stepgraph::engine::{Coordinator, CoordinatorOptions, RunResult};
use stepgraph::errors::Result;
use stepgraph::store::{MemoryStatusStore, ParameterSnapshot};

/// Placeholder command; never actually executed by the scripted executor.
pub fn cmd(tag: &str) -> Operation {
    Operation::command("echo", [tag])
}

/// Declare a placeholder command step `id` after `after`.
pub fn declare(run: &mut Run, id: &str, after: &[&str]) {
    run.graph
        .declare(StepDecl::new(cmd(id)).id(id).after_all(after.iter().copied()))
        .expect("valid declaration");
}

/// Declare a barrier `id` over `level`.
pub fn barrier(run: &mut Run, id: &str, level: &[&str]) {
    run.graph
        .declare_named_barrier(id, level.iter().copied())
        .expect("valid barrier");
}

pub fn params(pairs: &[(&str, &str)]) -> ParameterSnapshot {
    pairs.iter().map(|(k, v)| (*k, *v)).collect()
}

/// Mark `ids` as done by a previous invocation with the run's current
/// parameters and fingerprints.
pub fn seed_previous_run(store: &MemoryStatusStore, run: &Run, ids: &[&str]) {
    store.set_snapshot(run.parameters.clone());
    for id in ids {
        let step = run.graph.get(id).expect("seeded step is declared");
        store.insert_done(id, &step.fingerprint);
    }
}

/// Run `run` against `store` with a scripted executor.
pub async fn run_scripted(
    store: &MemoryStatusStore,
    run: &Run,
    concurrency: usize,
    script: Script,
) -> (Result<RunResult>, DispatchRecord) {
    let record = DispatchRecord::new();
    let mut coordinator = Coordinator::new(store.clone(), CoordinatorOptions { concurrency });
    let rec = record.clone();
    let result = with_timeout(
        coordinator.run_with(run, move |tx| ScriptedExecutor::new(tx, script, rec)),
    )
    .await;
    (result, record)
}
