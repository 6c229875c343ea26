// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{PipelineFile, RawPipelineFile};
use crate::errors::Result;

/// Load a pipeline file from a given path and return the raw `RawPipelineFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let pipeline: RawPipelineFile = toml::from_str(&contents)?;

    Ok(pipeline)
}

/// Load a pipeline file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - duplicate or malformed step ids,
///   - missing fields for each step kind,
///   - unknown, forward and cyclic `after` references,
///   - unknown `{placeholders}` and `when` parameters.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let raw = load_from_path(&path)?;
    PipelineFile::try_from(raw)
}

/// Default pipeline file location (`Pipeline.toml` in the current directory).
pub fn default_pipeline_path() -> PathBuf {
    PathBuf::from("Pipeline.toml")
}

/// Resolve the working directory declared by a pipeline file.
///
/// Relative paths are taken relative to the pipeline file's directory (or the
/// current directory for a bare file name).
pub fn resolve_working_dir(pipeline_path: &Path, working_dir: &str) -> PathBuf {
    let declared = PathBuf::from(working_dir);
    if declared.is_absolute() {
        return declared;
    }
    let base = match pipeline_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    base.join(declared)
}
