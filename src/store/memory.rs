// src/store/memory.rs

//! In-process status store.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::errors::{Result, StepFailure, StepgraphError};
use crate::store::{ParameterSnapshot, StatusStore, StoredStatus};
use crate::types::{StepId, StepStatus};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<StepId, StoredStatus>,
    snapshot: Option<ParameterSnapshot>,
    /// Every successful `record_step_status`, in order.
    history: Vec<(StepId, StepStatus)>,
    /// Remaining successful writes before writes start failing.
    writes_left: Option<usize>,
}

/// Status store kept in memory.
///
/// Clones share state, so a test can hand one clone to the coordinator and
/// inspect another afterwards.
#[derive(Debug, Clone, Default)]
pub struct MemoryStatusStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if written by a previous invocation.
    pub fn insert(&self, record: StoredStatus) {
        self.lock().records.insert(record.id.clone(), record);
    }

    /// Seed a `Done` record with the given fingerprint.
    pub fn insert_done(&self, id: &str, fingerprint: &str) {
        self.insert(StoredStatus {
            id: id.to_string(),
            status: StepStatus::Done,
            fingerprint: fingerprint.to_string(),
            timestamp: Utc::now(),
            error: None,
        });
    }

    pub fn set_snapshot(&self, snapshot: ParameterSnapshot) {
        self.lock().snapshot = Some(snapshot);
    }

    pub fn get(&self, id: &str) -> Option<StoredStatus> {
        self.lock().records.get(id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.lock().records.get(id).map(|r| r.status)
    }

    pub fn snapshot(&self) -> Option<ParameterSnapshot> {
        self.lock().snapshot.clone()
    }

    pub fn history(&self) -> Vec<(StepId, StepStatus)> {
        self.lock().history.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Let `n` more step-status writes succeed, then fail every further one
    /// with an I/O error.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_left = Some(n);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StatusStore for MemoryStatusStore {
    fn load_prior_status(&self) -> Result<HashMap<StepId, StoredStatus>> {
        Ok(self.lock().records.clone())
    }

    fn record_step_status(
        &mut self,
        id: &str,
        status: StepStatus,
        fingerprint: &str,
        error: Option<&StepFailure>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if let Some(left) = inner.writes_left.as_mut() {
            if *left == 0 {
                return Err(StepgraphError::status_store(
                    PathBuf::from(format!("memory://{id}")),
                    io::Error::other("injected write failure"),
                ));
            }
            *left -= 1;
        }

        inner.records.insert(
            id.to_string(),
            StoredStatus {
                id: id.to_string(),
                status,
                fingerprint: fingerprint.to_string(),
                timestamp: Utc::now(),
                error: error.cloned(),
            },
        );
        inner.history.push((id.to_string(), status));
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<ParameterSnapshot>> {
        Ok(self.lock().snapshot.clone())
    }

    fn save_snapshot(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        self.lock().snapshot = Some(snapshot.clone());
        Ok(())
    }

    fn invalidate(&mut self) -> Result<()> {
        self.lock().records.clear();
        Ok(())
    }
}
