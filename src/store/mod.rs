// src/store/mod.rs

//! Persistent run state: parameter snapshots and per-step status records.
//!
//! - [`fingerprint`] computes step fingerprints.
//! - [`snapshot`] holds the parameter snapshot and drift comparison.
//! - [`file`] is the durable store used in production.
//! - [`memory`] is an in-process store for tests and dry runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{Result, StepFailure};
use crate::types::{StepId, StepStatus};

pub mod file;
pub mod fingerprint;
pub mod memory;
pub mod snapshot;

pub use file::FileStatusStore;
pub use memory::MemoryStatusStore;
pub use snapshot::{ParameterChange, ParameterSnapshot, SnapshotCheck, SnapshotDiff};

/// Persisted status of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredStatus {
    pub id: StepId,
    pub status: StepStatus,
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepFailure>,
}

/// Abstract storage for run state.
///
/// Every `record_step_status` call must be durable when it returns; the
/// coordinator does not act on a transition before it has been recorded.
pub trait StatusStore: Send {
    /// All step records of the working directory, keyed by step id.
    fn load_prior_status(&self) -> Result<HashMap<StepId, StoredStatus>>;

    /// Atomically replace the record of one step.
    fn record_step_status(
        &mut self,
        id: &str,
        status: StepStatus,
        fingerprint: &str,
        error: Option<&StepFailure>,
    ) -> Result<()>;

    fn load_snapshot(&self) -> Result<Option<ParameterSnapshot>>;

    fn save_snapshot(&mut self, snapshot: &ParameterSnapshot) -> Result<()>;

    /// Discard every step record (explicit reset).
    fn invalidate(&mut self) -> Result<()>;

    /// Compare `snapshot` with the persisted one.
    ///
    /// On drift (or when no snapshot exists) all step records are discarded
    /// *before* the new snapshot is saved, so an interruption between the two
    /// writes is detected again on the next invocation.
    fn check_parameters(&mut self, snapshot: &ParameterSnapshot) -> Result<SnapshotCheck> {
        match self.load_snapshot()? {
            None => {
                let discarded = self.load_prior_status()?.len();
                self.invalidate()?;
                self.save_snapshot(snapshot)?;
                if discarded == 0 {
                    return Ok(SnapshotCheck::FirstRun);
                }
                warn!(
                    discarded,
                    "step records found without a parameter snapshot; invalidating them"
                );
                Ok(SnapshotCheck::Unverified { discarded })
            }
            Some(previous) => {
                let diff = previous.diff(snapshot);
                if diff.is_empty() {
                    return Ok(SnapshotCheck::Unchanged);
                }
                info!(
                    changed = ?diff.names(),
                    "parameters changed since previous run; invalidating all step records"
                );
                self.invalidate()?;
                self.save_snapshot(snapshot)?;
                Ok(SnapshotCheck::Drifted(diff))
            }
        }
    }
}
