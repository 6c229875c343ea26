// src/config/mod.rs

//! Pipeline file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a pipeline file from disk (`loader.rs`).
//! - Validate step declarations and references (`validate.rs`).
//! - Resolve `{name}` placeholders (`template.rs`).

pub mod loader;
pub mod model;
pub mod template;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve_working_dir};
pub use model::{PipelineFile, PipelineSection, RawPipelineFile, StepConfig, StepKind};
