// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning processes
//! itself, so tests can swap in a fake that reports scripted outcomes.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::dag::ScheduledStep;
use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting how dispatched steps are executed.
///
/// Implementations report every dispatched step exactly once with a
/// `RuntimeEvent::StepCompleted`.
pub trait ExecutorBackend: Send {
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production backend: forwards steps to the background executor loop.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ScheduledStep>,
}

impl RealExecutorBackend {
    /// Spawns the executor loop immediately; steps run in `working_dir`.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, working_dir: impl Into<PathBuf>) -> Self {
        let tx = spawn_executor(runtime_tx, working_dir.into());
        Self { tx }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_steps(
        &mut self,
        steps: Vec<ScheduledStep>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for step in steps {
                tx.send(step).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
