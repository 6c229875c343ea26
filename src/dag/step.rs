// src/dag/step.rs

//! Step descriptors: what a step does and what it depends on.

use std::path::PathBuf;

use crate::types::StepId;

/// The work a step performs, resolved once at declaration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Run an external program with discrete argument tokens (no shell).
    Command { program: String, args: Vec<String> },
    /// Create directories (idempotent).
    MakeDirs { paths: Vec<PathBuf> },
    /// Copy a single file.
    Copy { from: PathBuf, to: PathBuf },
    /// Create a symbolic link at `link` pointing to `target`.
    Symlink { target: PathBuf, link: PathBuf },
    /// No-op synchronisation point for a pipeline level.
    Barrier,
}

impl Operation {
    pub fn command<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Operation::Command {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Reserved operation tag, persisted as part of the fingerprint.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Command { .. } => "command",
            Operation::MakeDirs { .. } => "mkdir",
            Operation::Copy { .. } => "copy",
            Operation::Symlink { .. } => "symlink",
            Operation::Barrier => "barrier",
        }
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Operation::Barrier)
    }

    /// Short human label, used for generated step ids.
    pub fn label(&self) -> String {
        match self {
            Operation::Command { program, .. } => {
                let base = program.rsplit(['/', '\\']).next().unwrap_or(program);
                if base.is_empty() {
                    "command".to_string()
                } else {
                    base.to_string()
                }
            }
            other => other.tag().to_string(),
        }
    }

    /// Resolved argument tokens in declaration order.
    ///
    /// For commands this is the program followed by its arguments; for
    /// built-in operations the paths they act on.
    pub fn tokens(&self) -> Vec<String> {
        match self {
            Operation::Command { program, args } => {
                std::iter::once(program.clone()).chain(args.iter().cloned()).collect()
            }
            Operation::MakeDirs { paths } => paths.iter().map(|p| p.display().to_string()).collect(),
            Operation::Copy { from, to } => {
                vec![from.display().to_string(), to.display().to_string()]
            }
            Operation::Symlink { target, link } => {
                vec![target.display().to_string(), link.display().to_string()]
            }
            Operation::Barrier => Vec::new(),
        }
    }

    /// Printable one-line description (for logs and dry runs).
    pub fn display_line(&self) -> String {
        let tokens = self.tokens();
        match self {
            Operation::Command { .. } => tokens.iter().map(|t| quote_token(t)).collect::<Vec<_>>().join(" "),
            Operation::Barrier => "(barrier)".to_string(),
            other => format!("{} {}", other.tag(), tokens.join(" ")),
        }
    }
}

fn quote_token(token: &str) -> String {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", token.replace('\'', "'\\''"))
    } else {
        token.to_string()
    }
}

/// A declared step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    /// Position in declaration order (tie-break for dispatch).
    pub index: usize,
    pub operation: Operation,
    /// Direct prerequisites, in the order they were declared.
    pub prerequisites: Vec<StepId>,
    /// Files the step must produce. Relative paths are resolved against the
    /// run's working directory.
    pub outputs: Vec<PathBuf>,
    /// Hash over operation identity, resolved arguments and outputs.
    pub fingerprint: String,
}

impl Step {
    pub fn is_barrier(&self) -> bool {
        self.operation.is_barrier()
    }

    /// Resolved argument values (see [`Operation::tokens`]).
    pub fn args(&self) -> Vec<String> {
        self.operation.tokens()
    }
}

/// Declaration request passed to [`StepGraph::declare`](crate::dag::StepGraph::declare).
#[derive(Debug, Clone)]
pub struct StepDecl {
    pub id: Option<StepId>,
    pub operation: Operation,
    pub prerequisites: Vec<StepId>,
    pub outputs: Vec<PathBuf>,
}

impl StepDecl {
    pub fn new(operation: Operation) -> Self {
        Self {
            id: None,
            operation,
            prerequisites: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn id(mut self, id: impl Into<StepId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn after(mut self, prerequisite: impl Into<StepId>) -> Self {
        self.prerequisites.push(prerequisite.into());
        self
    }

    pub fn after_all<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.prerequisites
            .extend(prerequisites.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }
}

/// Description of a step that the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledStep {
    pub id: StepId,
    pub index: usize,
    pub operation: Operation,
    pub outputs: Vec<PathBuf>,
    pub fingerprint: String,
}

impl ScheduledStep {
    pub fn from_step(step: &Step) -> Self {
        Self {
            id: step.id.clone(),
            index: step.index,
            operation: step.operation.clone(),
            outputs: step.outputs.clone(),
            fingerprint: step.fingerprint.clone(),
        }
    }
}
