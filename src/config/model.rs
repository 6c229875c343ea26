// src/config/model.rs

use serde::Deserialize;

use crate::store::ParameterSnapshot;

/// Top-level pipeline description as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "preprocess_micrographs"
/// working_dir = "runs/run_001"
/// jobs = 4
///
/// [params]
/// crop = 100
/// down = 2
///
/// [[step]]
/// id = "downsample"
/// run = "xmipp_transform_downsample"
/// args = ["-i", "{item}.mrc", "-o", "{item}_down.spi", "--step", "{down}"]
/// each = ["mic01", "mic02"]
/// outputs = ["{item}_down.spi"]
/// ```
///
/// Steps are declared in file order; `[params]` keeps its key order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Protocol input values. These form the parameter snapshot and are
    /// available as `{name}` placeholders.
    #[serde(default)]
    pub params: toml::Table,

    /// All steps from `[[step]]`, in declaration order.
    #[serde(default)]
    pub step: Vec<StepConfig>,
}

impl RawPipelineFile {
    /// Override (or add) parameters, e.g. from `--set name=value`.
    pub fn apply_overrides<'a, I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in overrides {
            self.params
                .insert(name.to_string(), parse_param_value(value));
        }
    }
}

/// A validated pipeline. Construct via `PipelineFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    pub pipeline: PipelineSection,
    pub params: toml::Table,
    pub step: Vec<StepConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(
        pipeline: PipelineSection,
        params: toml::Table,
        step: Vec<StepConfig>,
    ) -> Self {
        Self {
            pipeline,
            params,
            step,
        }
    }

    pub fn name(&self) -> &str {
        self.pipeline.name.as_deref().unwrap_or("pipeline")
    }

    /// Snapshot of all parameter values, in declaration order.
    pub fn parameters(&self) -> ParameterSnapshot {
        self.params
            .iter()
            .map(|(k, v)| (k.clone(), render_value(v)))
            .collect()
    }
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub name: Option<String>,

    /// Root for all step artifacts and status records, relative to the
    /// pipeline file's directory unless absolute.
    #[serde(default = "default_working_dir")]
    pub working_dir: String,

    /// Maximum number of steps running at the same time.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// If true, a step without `after` depends on the previously declared
    /// step instead of nothing.
    #[serde(default)]
    pub sequential: bool,
}

fn default_working_dir() -> String {
    ".".to_string()
}

fn default_jobs() -> usize {
    1
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: None,
            working_dir: default_working_dir(),
            jobs: default_jobs(),
            sequential: false,
        }
    }
}

/// What kind of work a `[[step]]` performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// External program (`run` + `args`).
    #[default]
    Command,
    /// Create the directories in `paths`.
    Mkdir,
    /// Copy `from` to `to`.
    Copy,
    /// Symlink `to` pointing at `from`.
    Symlink,
    /// No-op synchronisation point over `after`.
    Barrier,
}

/// `[[step]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    /// Unique step id. Fan-out steps expand to `id[item]` plus a barrier
    /// named `id`.
    pub id: String,

    #[serde(default)]
    pub kind: StepKind,

    /// Program to execute (`kind = "command"`).
    #[serde(default)]
    pub run: Option<String>,

    /// Argument tokens, passed to the program one by one.
    #[serde(default)]
    pub args: Vec<String>,

    /// Directories to create (`kind = "mkdir"`).
    #[serde(default)]
    pub paths: Vec<String>,

    /// Source file (`copy`) or link target (`symlink`).
    #[serde(default)]
    pub from: Option<String>,

    /// Destination file (`copy`) or link path (`symlink`).
    #[serde(default)]
    pub to: Option<String>,

    /// Prerequisites. `None` and `Some([])` differ only in sequential
    /// pipelines.
    #[serde(default)]
    pub after: Option<Vec<String>>,

    /// Files the step must produce for it to count as done.
    #[serde(default)]
    pub outputs: Vec<String>,

    /// Fan-out items; `{item}` is available in every templated field.
    #[serde(default)]
    pub each: Option<Vec<String>>,

    /// Name of a parameter; the step is only declared if it is truthy.
    #[serde(default)]
    pub when: Option<String>,
}

impl StepConfig {
    /// Every templated string of this step, for placeholder validation.
    pub fn templated_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        fields.extend(self.run.as_deref());
        fields.extend(self.args.iter().map(String::as_str));
        fields.extend(self.paths.iter().map(String::as_str));
        fields.extend(self.from.as_deref());
        fields.extend(self.to.as_deref());
        fields.extend(self.outputs.iter().map(String::as_str));
        if let Some(after) = &self.after {
            fields.extend(after.iter().map(String::as_str));
        }
        fields
    }
}

/// Render a TOML value the way it appears in the snapshot and in `{name}`
/// substitutions. Strings are used verbatim.
pub fn render_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a command-line parameter value: integers, floats and booleans keep
/// their type, anything else becomes a string.
pub fn parse_param_value(raw: &str) -> toml::Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return toml::Value::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return toml::Value::Float(f);
    }
    if let Ok(b) = trimmed.parse::<bool>() {
        return toml::Value::Boolean(b);
    }
    toml::Value::String(raw.to_string())
}

/// Truthiness used by `when`.
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}
