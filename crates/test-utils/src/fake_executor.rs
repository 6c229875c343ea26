use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepgraph::dag::ScheduledStep;
use stepgraph::engine::{RuntimeEvent, StepOutcome};
use stepgraph::errors::{Result, StepFailure};
use stepgraph::exec::{CapturedOutput, ExecutorBackend};

/// What a [`ScriptedExecutor`] does with each step.
#[derive(Debug, Clone, Default)]
pub struct Script {
    failures: HashMap<String, StepFailure>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    stderr: HashMap<String, Vec<String>>,
    cancel_after: Option<usize>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `id` as failed with `failure`.
    pub fn fail(mut self, id: &str, failure: StepFailure) -> Self {
        self.failures.insert(id.to_string(), failure);
        self
    }

    /// Report `id` as a process that exited with `code`.
    pub fn fail_with_exit(self, id: &str, code: i32) -> Self {
        self.fail(id, StepFailure::ProcessFailure { exit_code: code })
    }

    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.delays.insert(id.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Attach captured stderr lines to the completion of `id`.
    pub fn stderr(mut self, id: &str, lines: &[&str]) -> Self {
        self.stderr
            .insert(id.to_string(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    /// Request cancellation right after the `n`-th dispatch.
    pub fn cancel_after(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }
}

#[derive(Debug, Default)]
struct RecordInner {
    dispatched: Vec<String>,
    in_flight: usize,
    max_in_flight: usize,
}

/// Shared view of what a [`ScriptedExecutor`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct DispatchRecord {
    inner: Arc<Mutex<RecordInner>>,
}

impl DispatchRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step ids in dispatch order.
    pub fn dispatched(&self) -> Vec<String> {
        self.inner.lock().unwrap().dispatched.clone()
    }

    /// Highest number of steps that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }
}

/// A fake executor that:
/// - records which steps were dispatched
/// - reports each step's scripted outcome after its scripted delay.
pub struct ScriptedExecutor {
    runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
    script: Arc<Script>,
    record: DispatchRecord,
}

impl ScriptedExecutor {
    pub fn new(
        runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
        script: Script,
        record: DispatchRecord,
    ) -> Self {
        Self {
            runtime_tx,
            script: Arc::new(script),
            record,
        }
    }
}

impl ExecutorBackend for ScriptedExecutor {
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let script = Arc::clone(&self.script);
        let record = self.record.clone();

        Box::pin(async move {
            for step in steps {
                let dispatched = {
                    let mut guard = record.inner.lock().unwrap();
                    guard.dispatched.push(step.id.clone());
                    guard.in_flight += 1;
                    guard.max_in_flight = guard.max_in_flight.max(guard.in_flight);
                    guard.dispatched.len()
                };

                let outcome = match script.failures.get(&step.id) {
                    Some(failure) => StepOutcome::Failed(failure.clone()),
                    None => StepOutcome::Success,
                };
                let output = CapturedOutput {
                    stdout: Vec::new(),
                    stderr: script.stderr.get(&step.id).cloned().unwrap_or_default(),
                };
                let delay = script
                    .delays
                    .get(&step.id)
                    .copied()
                    .unwrap_or(script.default_delay);

                // Completions are sent from their own task so the runtime
                // never waits on a full channel while dispatching.
                let tx_done = tx.clone();
                let record_done = record.clone();
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    record_done.inner.lock().unwrap().in_flight -= 1;
                    let _ = tx_done
                        .send(RuntimeEvent::StepCompleted {
                            step: step.id,
                            outcome,
                            output,
                        })
                        .await;
                });

                if script.cancel_after == Some(dispatched) {
                    let tx_cancel = tx.clone();
                    tokio::spawn(async move {
                        let _ = tx_cancel.send(RuntimeEvent::ShutdownRequested).await;
                    });
                }
            }
            Ok(())
        })
    }
}
