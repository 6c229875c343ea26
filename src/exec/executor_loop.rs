// src/exec/executor_loop.rs

//! Background executor loop that runs dispatched steps.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::exec::step_runner::run_step;
use crate::types::StepId;

/// Spawn the background executor loop.
///
/// The returned sender is what `RealExecutorBackend` forwards dispatched
/// steps to. Each step runs in its own Tokio task; the coordinator bounds how
/// many are in flight. A step id that is still running is never started a
/// second time.
pub fn spawn_executor(
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    working_dir: PathBuf,
) -> mpsc::Sender<ScheduledStep> {
    let (tx, mut rx) = mpsc::channel::<ScheduledStep>(32);

    tokio::spawn(async move {
        info!(working_dir = ?working_dir, "executor loop started");

        let mut active: HashMap<StepId, JoinHandle<()>> = HashMap::new();

        while let Some(step) = rx.recv().await {
            active.retain(|_, handle| !handle.is_finished());

            if active.contains_key(&step.id) {
                warn!(step = %step.id, "step already running; ignoring duplicate dispatch");
                continue;
            }

            let id = step.id.clone();
            let rt_tx = runtime_tx.clone();
            let wd = working_dir.clone();
            let handle = tokio::spawn(async move {
                let id = step.id.clone();
                run_step(step, wd, rt_tx).await;
                debug!(step = %id, "step runner finished");
            });
            active.insert(id, handle);
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}
