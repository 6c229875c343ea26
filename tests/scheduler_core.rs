// tests/scheduler_core.rs
//
// Drives the pure scheduler / core coordinator by hand, without Tokio.

mod common;

use std::path::PathBuf;

use stepgraph::dag::{Run, Scheduler};
use stepgraph::engine::{CoreCommand, CoreCoordinator, RuntimeEvent, StepOutcome};
use stepgraph::errors::StepFailure;
use stepgraph::exec::CapturedOutput;
use stepgraph::types::{RunStatus, StepStatus};

use crate::common::{barrier, declare, params};

fn new_run() -> Run {
    Run::new(PathBuf::from("/tmp/unused"), params(&[]))
}

fn fail() -> StepOutcome {
    StepOutcome::Failed(StepFailure::ProcessFailure { exit_code: 1 })
}

#[test]
fn start_dispatches_roots_in_declaration_order() {
    let mut run = new_run();
    declare(&mut run, "b", &[]);
    declare(&mut run, "a", &[]);
    declare(&mut run, "c", &["a"]);

    let mut s = Scheduler::new(run.graph, 4);
    let step = s.start();

    assert_eq!(step.dispatched_ids(), vec!["b", "a"]);
    assert_eq!(step.reached(StepStatus::Ready), vec!["b", "a"]);
    assert_eq!(step.reached(StepStatus::Running), vec!["b", "a"]);
    assert_eq!(s.status_of("c"), Some(StepStatus::Pending));
    assert_eq!(s.in_flight(), 2);
    assert!(!step.run_finished);
}

#[test]
fn concurrency_limit_bounds_dispatch() {
    let mut run = new_run();
    for id in ["s0", "s1", "s2", "s3"] {
        declare(&mut run, id, &[]);
    }

    let mut s = Scheduler::new(run.graph, 2);
    let first = s.start();
    assert_eq!(first.dispatched_ids(), vec!["s0", "s1"]);
    assert_eq!(s.steps_with(StepStatus::Ready), vec!["s2", "s3"]);

    let next = s.step_completion("s1", StepOutcome::Success);
    assert_eq!(next.dispatched_ids(), vec!["s2"]);
    assert_eq!(s.in_flight(), 2);
}

#[test]
fn zero_concurrency_is_treated_as_one() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &[]);

    let mut s = Scheduler::new(run.graph, 0);
    assert_eq!(s.concurrency(), 1);
    assert_eq!(s.start().dispatched_ids(), vec!["a"]);
}

#[test]
fn barrier_releases_next_level_only_when_whole_level_is_done() {
    let mut run = new_run();
    declare(&mut run, "p1", &[]);
    declare(&mut run, "p2", &[]);
    declare(&mut run, "p3", &[]);
    barrier(&mut run, "x", &["p1", "p2", "p3"]);
    declare(&mut run, "q", &["x"]);

    let mut s = Scheduler::new(run.graph, 3);
    assert_eq!(s.start().dispatched_ids(), vec!["p1", "p2", "p3"]);

    for id in ["p3", "p1"] {
        let step = s.step_completion(id, StepOutcome::Success);
        assert!(step.dispatch.is_empty());
        assert_eq!(s.status_of("x"), Some(StepStatus::Pending));
        assert_eq!(s.status_of("q"), Some(StepStatus::Pending));
    }

    let last = s.step_completion("p2", StepOutcome::Success);
    // The barrier completes on the spot and never occupies a slot.
    assert_eq!(
        last.reached(StepStatus::Done),
        vec!["p2", "x"],
        "barrier completes in the same step as its last prerequisite"
    );
    assert_eq!(last.dispatched_ids(), vec!["q"]);
    assert_eq!(s.in_flight(), 1);
}

#[test]
fn failure_blocks_only_transitive_dependents() {
    // a -> b -> e, c -> d
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &["a"]);
    declare(&mut run, "c", &[]);
    declare(&mut run, "d", &["c"]);
    declare(&mut run, "e", &["b"]);

    let mut s = Scheduler::new(run.graph, 1);
    assert_eq!(s.start().dispatched_ids(), vec!["a"]);

    let step = s.step_completion("a", fail());
    assert_eq!(step.newly_blocked, vec!["b", "e"]);
    assert_eq!(step.dispatched_ids(), vec!["c"]);
    assert_eq!(s.failure_of("a"), Some(&StepFailure::ProcessFailure { exit_code: 1 }));

    let step = s.step_completion("c", StepOutcome::Success);
    assert_eq!(step.dispatched_ids(), vec!["d"]);
    let step = s.step_completion("d", StepOutcome::Success);
    assert!(step.run_finished);

    assert_eq!(s.steps_with(StepStatus::Done), vec!["c", "d"]);
    assert_eq!(s.steps_with(StepStatus::Blocked), vec!["b", "e"]);
    assert_eq!(s.run_status(), RunStatus::Failed);
}

#[test]
fn step_is_blocked_when_any_prerequisite_fails() {
    // a, b -> c ; b succeeds first, then a fails.
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &[]);
    declare(&mut run, "c", &["a", "b"]);

    let mut s = Scheduler::new(run.graph, 2);
    s.start();
    s.step_completion("b", StepOutcome::Success);
    let step = s.step_completion("a", fail());

    assert_eq!(step.newly_blocked, vec!["c"]);
    assert!(step.run_finished);
}

#[test]
fn completions_for_unknown_or_idle_steps_are_ignored() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &["a"]);

    let mut s = Scheduler::new(run.graph, 1);
    s.start();

    let step = s.step_completion("nope", StepOutcome::Success);
    assert!(step.changes.is_empty());
    // b was never dispatched.
    let step = s.step_completion("b", StepOutcome::Success);
    assert!(step.changes.is_empty());
    assert_eq!(s.status_of("b"), Some(StepStatus::Pending));
    assert_eq!(s.in_flight(), 1);
}

#[test]
fn seeded_steps_are_not_dispatched_again() {
    // a -> c -> d, b -> d
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &[]);
    declare(&mut run, "c", &["a"]);
    declare(&mut run, "d", &["c", "b"]);

    let mut s = Scheduler::new(run.graph, 4);
    s.seed_done(["a", "b"]);

    let step = s.start();
    assert_eq!(step.dispatched_ids(), vec!["c"]);
    assert!(step.changes.iter().all(|c| c.step == "c"));

    let step = s.step_completion("c", StepOutcome::Success);
    assert_eq!(step.dispatched_ids(), vec!["d"]);
    s.step_completion("d", StepOutcome::Success);
    assert_eq!(s.run_status(), RunStatus::Complete);
}

#[test]
fn everything_seeded_finishes_immediately() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    barrier(&mut run, "x", &["a"]);

    let mut s = Scheduler::new(run.graph, 1);
    s.seed_done(["a", "x"]);
    let step = s.start();

    assert!(step.changes.is_empty());
    assert!(step.run_finished);
    assert_eq!(s.run_status(), RunStatus::Complete);
}

#[test]
fn cancel_stops_dispatch_but_waits_for_in_flight() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &[]);
    declare(&mut run, "c", &["a"]);

    let mut s = Scheduler::new(run.graph, 1);
    s.start();

    let step = s.cancel();
    assert!(!step.run_finished, "a is still running");

    let step = s.step_completion("a", StepOutcome::Success);
    assert!(step.dispatch.is_empty());
    assert!(step.run_finished);
    assert_eq!(s.status_of("a"), Some(StepStatus::Done));
    assert_eq!(s.status_of("b"), Some(StepStatus::Ready));
    assert_eq!(s.status_of("c"), Some(StepStatus::Ready));
    assert_eq!(s.run_status(), RunStatus::Incomplete);
}

#[test]
fn core_translates_scheduler_steps_into_commands() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);
    declare(&mut run, "b", &["a"]);

    let mut core = CoreCoordinator::new(Scheduler::new(run.graph, 1));

    let start = core.start();
    assert!(start.keep_running);
    let dispatched: Vec<_> = start.dispatched().map(|s| s.id.as_str()).collect();
    assert_eq!(dispatched, vec!["a"]);
    assert_eq!(start.changes.len(), 2);

    let next = core.step(RuntimeEvent::StepCompleted {
        step: "a".into(),
        outcome: StepOutcome::Success,
        output: CapturedOutput::default(),
    });
    let dispatched: Vec<_> = next.dispatched().map(|s| s.id.as_str()).collect();
    assert_eq!(dispatched, vec!["b"]);

    let last = core.step(RuntimeEvent::StepCompleted {
        step: "b".into(),
        outcome: StepOutcome::Success,
        output: CapturedOutput::default(),
    });
    assert!(!last.keep_running);
    assert!(matches!(last.commands.last(), Some(CoreCommand::RequestExit)));
    assert_eq!(core.run_status(), RunStatus::Complete);
}

#[test]
fn core_shutdown_with_nothing_in_flight_exits() {
    let mut run = new_run();
    declare(&mut run, "a", &[]);

    let mut core = CoreCoordinator::new(Scheduler::new(run.graph, 1));
    core.start();
    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(step.keep_running, "a is in flight");

    let step = core.step(RuntimeEvent::StepCompleted {
        step: "a".into(),
        outcome: StepOutcome::Success,
        output: CapturedOutput::default(),
    });
    assert!(!step.keep_running);
}
