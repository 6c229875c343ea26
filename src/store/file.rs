// src/store/file.rs

//! Durable status store under `<working_dir>/.stepgraph/`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{Result, StepFailure, StepgraphError};
use crate::store::fingerprint::record_key;
use crate::store::{ParameterSnapshot, StatusStore, StoredStatus};
use crate::types::{StepId, StepStatus};

/// Directory (relative to the working directory) holding all run state.
pub const STATE_DIR: &str = ".stepgraph";

const STATUS_DIR: &str = "status";
const PARAMS_FILE: &str = "params.json";
const PIPELINE_BACKUP: &str = "pipeline.toml";

/// One JSON file per step plus a parameter snapshot, each replaced
/// atomically on every write.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    root: PathBuf,
}

impl FileStatusStore {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            root: working_dir.as_ref().join(STATE_DIR),
        }
    }

    /// The `.stepgraph` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn params_path(&self) -> PathBuf {
        self.root.join(PARAMS_FILE)
    }

    pub fn status_dir(&self) -> PathBuf {
        self.root.join(STATUS_DIR)
    }

    /// Path of the record for `id`.
    pub fn record_path(&self, id: &str) -> PathBuf {
        self.status_dir().join(format!("{}.json", record_key(id)))
    }

    /// Keep a copy of the pipeline file next to the run state.
    pub fn backup_pipeline(&self, pipeline_path: &Path) -> Result<()> {
        let dest = self.root.join(PIPELINE_BACKUP);
        let bytes = fs::read(pipeline_path)
            .map_err(|e| StepgraphError::status_store(pipeline_path, e))?;
        atomic_write_bytes(&dest, &bytes).map_err(|e| StepgraphError::status_store(&dest, e))?;
        debug!(path = ?dest, "backed up pipeline file");
        Ok(())
    }
}

impl StatusStore for FileStatusStore {
    fn load_prior_status(&self) -> Result<HashMap<StepId, StoredStatus>> {
        let dir = self.status_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(StepgraphError::status_store(&dir, e)),
        };

        let mut records = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| StepgraphError::status_store(&dir, e))?;
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            let bytes = fs::read(&path).map_err(|e| StepgraphError::status_store(&path, e))?;
            match serde_json::from_slice::<StoredStatus>(&bytes) {
                Ok(record) => {
                    records.insert(record.id.clone(), record);
                }
                Err(e) => {
                    // Unreadable records count as absent; the step re-runs.
                    warn!(path = ?path, error = %e, "ignoring unreadable status record");
                }
            }
        }

        debug!(count = records.len(), dir = ?dir, "loaded prior step status");
        Ok(records)
    }

    fn record_step_status(
        &mut self,
        id: &str,
        status: StepStatus,
        fingerprint: &str,
        error: Option<&StepFailure>,
    ) -> Result<()> {
        let record = StoredStatus {
            id: id.to_string(),
            status,
            fingerprint: fingerprint.to_string(),
            timestamp: Utc::now(),
            error: error.cloned(),
        };
        let path = self.record_path(id);
        write_json(&path, &record)?;
        debug!(step = %id, %status, "recorded step status");
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<ParameterSnapshot>> {
        let path = self.params_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StepgraphError::status_store(&path, e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                // Treated like a first run: every record gets invalidated.
                warn!(path = ?path, error = %e, "ignoring unreadable parameter snapshot");
                Ok(None)
            }
        }
    }

    fn save_snapshot(&mut self, snapshot: &ParameterSnapshot) -> Result<()> {
        write_json(&self.params_path(), snapshot)
    }

    fn invalidate(&mut self) -> Result<()> {
        let dir = self.status_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StepgraphError::status_store(&dir, e)),
        };

        let mut removed = 0usize;
        for entry in entries {
            let entry = entry.map_err(|e| StepgraphError::status_store(&dir, e))?;
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StepgraphError::status_store(&path, e)),
            }
        }
        sync_dir(&dir);

        info!(removed, dir = ?dir, "invalidated step status records");
        Ok(())
    }
}

fn is_record_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !name.starts_with('.') && name.ends_with(".json")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes).map_err(|e| StepgraphError::status_store(path, e))
}

/// Write to a sibling temp file, fsync it, then rename over `path`.
fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("record");
    let tmp = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        name,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }
    Ok(())
}

fn sync_dir(dir: &Path) {
    // Not supported on every platform; the rename itself is what matters.
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
