// tests/scheduler_properties.rs
//
// Random DAGs with random failures, driven through the pure scheduler.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use proptest::prelude::*;
use stepgraph::dag::{Operation, Scheduler, StepDecl, StepGraph};
use stepgraph::engine::StepOutcome;
use stepgraph::errors::StepFailure;
use stepgraph::types::{RunStatus, StepStatus};

#[derive(Debug, Clone)]
struct Shape {
    /// Per step: prerequisite indices (all smaller than the step's own).
    deps: Vec<BTreeSet<usize>>,
    barriers: HashSet<usize>,
}

// Acyclic by construction: step i may only depend on steps 0..i.
fn shape_strategy(max_steps: usize) -> impl Strategy<Value = Shape> {
    (1..=max_steps).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n),
            proptest::collection::vec(any::<bool>(), n),
        )
            .prop_map(move |(raw_deps, barrier_flags)| {
                let deps: Vec<BTreeSet<usize>> = raw_deps
                    .into_iter()
                    .enumerate()
                    .map(|(i, raw)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            raw.into_iter().map(|d| d % i).collect()
                        }
                    })
                    .collect();
                // Barriers need at least one prerequisite.
                let barriers = barrier_flags
                    .into_iter()
                    .enumerate()
                    .filter(|(i, flag)| *flag && !deps[*i].is_empty())
                    .map(|(i, _)| i)
                    .collect();
                Shape { deps, barriers }
            })
    })
}

fn name(i: usize) -> String {
    format!("s{i}")
}

fn build_graph(shape: &Shape) -> StepGraph {
    let mut graph = StepGraph::new();
    for (i, deps) in shape.deps.iter().enumerate() {
        let operation = if shape.barriers.contains(&i) {
            Operation::Barrier
        } else {
            Operation::command("echo", [name(i)])
        };
        let decl = StepDecl::new(operation)
            .id(name(i))
            .after_all(deps.iter().map(|&d| name(d)));
        graph.declare(decl).expect("generated graph is valid");
    }
    graph
}

/// Final status each step must end in when every step in `failing` fails.
fn expected_statuses(shape: &Shape, failing: &HashSet<usize>) -> Vec<StepStatus> {
    let mut out: Vec<StepStatus> = Vec::with_capacity(shape.deps.len());
    for (i, deps) in shape.deps.iter().enumerate() {
        let status = if deps.iter().all(|&d| out[d] == StepStatus::Done) {
            if failing.contains(&i) && !shape.barriers.contains(&i) {
                StepStatus::Failed
            } else {
                StepStatus::Done
            }
        } else {
            StepStatus::Blocked
        };
        out.push(status);
    }
    out
}

proptest! {
    #[test]
    fn scheduler_runs_random_dags_to_completion(
        shape in shape_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
        concurrency in 1..4usize,
        lifo in any::<bool>(),
    ) {
        let graph = build_graph(&shape);
        let mut scheduler = Scheduler::new(graph, concurrency);

        let mut in_flight: VecDeque<String> = VecDeque::new();
        let mut done_order: HashMap<String, usize> = HashMap::new();
        let mut clock = 0usize;

        let mut step = scheduler.start();
        let mut iterations = 0;
        loop {
            for change in &step.changes {
                clock += 1;
                if change.to == StepStatus::Running {
                    // Every prerequisite reached Done strictly before.
                    let i: usize = change.step[1..].parse().unwrap();
                    for &d in &shape.deps[i] {
                        let at = done_order.get(&name(d)).copied();
                        prop_assert!(
                            at.is_some_and(|t| t < clock),
                            "{} started before {} was done", change.step, name(d)
                        );
                    }
                }
                if change.to == StepStatus::Done {
                    done_order.insert(change.step.clone(), clock);
                }
            }
            for scheduled in &step.dispatch {
                prop_assert!(!scheduled.operation.is_barrier());
                in_flight.push_back(scheduled.id.clone());
            }
            prop_assert!(scheduler.in_flight() <= concurrency);
            prop_assert_eq!(scheduler.in_flight(), in_flight.len());

            if step.run_finished {
                prop_assert!(in_flight.is_empty());
                break;
            }

            iterations += 1;
            prop_assert!(iterations < 1000, "scheduler did not terminate");

            let id = if lifo { in_flight.pop_back() } else { in_flight.pop_front() };
            let Some(id) = id else {
                return Err(TestCaseError::fail("not finished but nothing in flight"));
            };
            let i: usize = id[1..].parse().unwrap();
            let outcome = if failing.contains(&i) {
                StepOutcome::Failed(StepFailure::ProcessFailure { exit_code: 1 })
            } else {
                StepOutcome::Success
            };
            step = scheduler.step_completion(&id, outcome);
        }

        let expected = expected_statuses(&shape, &failing);
        for (i, want) in expected.iter().enumerate() {
            prop_assert_eq!(scheduler.status_of(&name(i)), Some(*want), "step {}", name(i));
        }

        let want_run = if expected.iter().all(|s| *s == StepStatus::Done) {
            RunStatus::Complete
        } else {
            RunStatus::Failed
        };
        prop_assert_eq!(scheduler.run_status(), want_run);
        prop_assert_eq!(
            scheduler.failures().count(),
            expected.iter().filter(|s| **s == StepStatus::Failed).count()
        );
    }

    #[test]
    fn seeded_steps_are_never_dispatched(
        shape in shape_strategy(10),
        seed_prefix in 0..10usize,
    ) {
        let graph = build_graph(&shape);
        let mut scheduler = Scheduler::new(graph, 2);

        // A prefix in declaration order is closed under prerequisites.
        let seeded: Vec<String> = (0..seed_prefix.min(shape.deps.len())).map(name).collect();
        scheduler.seed_done(&seeded);

        let mut in_flight: VecDeque<String> = VecDeque::new();
        let mut step = scheduler.start();
        loop {
            for change in &step.changes {
                prop_assert!(!seeded.contains(&change.step), "{} changed", change.step);
            }
            in_flight.extend(step.dispatch.iter().map(|s| s.id.clone()));
            if step.run_finished {
                break;
            }
            let Some(id) = in_flight.pop_front() else { break };
            step = scheduler.step_completion(&id, StepOutcome::Success);
        }
        prop_assert_eq!(scheduler.run_status(), RunStatus::Complete);
    }
}
