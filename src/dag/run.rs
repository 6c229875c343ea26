// src/dag/run.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::model::{is_truthy, PipelineFile, StepConfig, StepKind};
use crate::config::template::{substitute, ITEM_VAR, WORKDIR_VAR};
use crate::config::validate::referenced_base;
use crate::dag::graph::StepGraph;
use crate::dag::step::{Operation, StepDecl};
use crate::errors::{Result, StepgraphError};
use crate::store::ParameterSnapshot;
use crate::types::StepId;

/// One protocol execution: declared steps, where they run, and the
/// parameters they were declared with.
#[derive(Debug, Clone)]
pub struct Run {
    pub working_dir: PathBuf,
    pub parameters: ParameterSnapshot,
    pub graph: StepGraph,
}

impl Run {
    pub fn new(working_dir: impl Into<PathBuf>, parameters: ParameterSnapshot) -> Self {
        Self {
            working_dir: working_dir.into(),
            parameters,
            graph: StepGraph::new(),
        }
    }

    /// Declare every step of a validated pipeline file, in file order.
    ///
    /// - `{name}` placeholders are resolved against `[params]`, `{workdir}`
    ///   and (for fan-out steps) `{item}`.
    /// - A fan-out step `id` with `each = [a, b]` becomes `id[a]`, `id[b]`
    ///   and a barrier `id` over both.
    /// - Steps whose `when` parameter is not truthy are skipped. An `after`
    ///   entry pointing at a skipped step is replaced by that step's own
    ///   prerequisites, so ordering around it is kept.
    pub fn from_config(cfg: &PipelineFile, working_dir: &Path) -> Result<Self> {
        let parameters = cfg.parameters();
        let mut run = Run::new(working_dir, parameters);

        let mut vars: HashMap<String, String> = run
            .parameters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        vars.insert(WORKDIR_VAR.to_string(), working_dir.display().to_string());

        let mut disabled = Disabled::default();
        let mut previous: Option<StepId> = None;

        for sc in &cfg.step {
            let sequential_prev = if cfg.pipeline.sequential {
                previous.as_ref()
            } else {
                None
            };

            if let Some(flag) = &sc.when {
                let enabled = vars.get(flag).map(|v| is_truthy(v)).unwrap_or(false);
                if !enabled {
                    info!(step = %sc.id, parameter = %flag, "step disabled by parameter; skipping");
                    disabled.skip(sc, &vars, sequential_prev)?;
                    continue;
                }
            }

            let last = match &sc.each {
                None => {
                    let decl = step_decl(sc, sc.id.clone(), &vars, &disabled, sequential_prev)?;
                    run.graph.declare(decl)?
                }
                Some(items) => {
                    let mut level = Vec::with_capacity(items.len());
                    for item in items {
                        let mut item_vars = vars.clone();
                        item_vars.insert(ITEM_VAR.to_string(), item.clone());
                        let id = format!("{}[{}]", sc.id, item);
                        let decl = step_decl(sc, id, &item_vars, &disabled, sequential_prev)?;
                        level.push(run.graph.declare(decl)?);
                    }
                    debug!(step = %sc.id, items = items.len(), "declaring fan-out barrier");
                    run.graph.declare_named_barrier(sc.id.clone(), level)?
                }
            };
            previous = Some(last);
        }

        Ok(run)
    }
}

/// Steps skipped by `when`, mapped to the prerequisites they would have had.
///
/// A fan-out step is recorded per item (`id[item]`) and as a whole (`id`),
/// mirroring the ids it would have declared.
#[derive(Debug, Default)]
struct Disabled {
    inherited: HashMap<StepId, Vec<StepId>>,
}

impl Disabled {
    fn skip(
        &mut self,
        sc: &StepConfig,
        vars: &HashMap<String, String>,
        sequential_prev: Option<&StepId>,
    ) -> Result<()> {
        match &sc.each {
            None => {
                let prereqs = prerequisites(sc, &sc.id, vars, self, sequential_prev)?;
                self.inherited.insert(sc.id.clone(), prereqs);
            }
            Some(items) => {
                let mut all: Vec<StepId> = Vec::new();
                for item in items {
                    let mut item_vars = vars.clone();
                    item_vars.insert(ITEM_VAR.to_string(), item.clone());
                    let id = format!("{}[{}]", sc.id, item);
                    let prereqs = prerequisites(sc, &id, &item_vars, self, sequential_prev)?;
                    push_unique(&mut all, prereqs.iter().cloned());
                    self.inherited.insert(id, prereqs);
                }
                self.inherited.insert(sc.id.clone(), all);
            }
        }
        Ok(())
    }

    /// What a resolved `after` entry stands for, if it names a skipped step.
    fn substitute(&self, entry: &str) -> Option<&[StepId]> {
        self.inherited
            .get(entry)
            .or_else(|| self.inherited.get(referenced_base(entry)))
            .map(Vec::as_slice)
    }
}

fn push_unique(into: &mut Vec<StepId>, ids: impl IntoIterator<Item = StepId>) {
    for id in ids {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

/// Resolved prerequisites of `sc` declared as `id`, with skipped steps
/// replaced by what they inherited.
fn prerequisites(
    sc: &StepConfig,
    id: &str,
    vars: &HashMap<String, String>,
    disabled: &Disabled,
    sequential_prev: Option<&StepId>,
) -> Result<Vec<StepId>> {
    let mut out = Vec::new();
    match &sc.after {
        Some(after) => {
            for entry in after {
                let resolved = resolve(id, entry, vars)?;
                match disabled.substitute(&resolved) {
                    Some(inherited) => {
                        debug!(
                            step = %id,
                            prerequisite = %resolved,
                            inherited = ?inherited,
                            "prerequisite is disabled; depending on its prerequisites instead"
                        );
                        push_unique(&mut out, inherited.iter().cloned());
                    }
                    None => push_unique(&mut out, [resolved]),
                }
            }
        }
        None => out.extend(sequential_prev.cloned()),
    }
    Ok(out)
}

fn resolve(step: &str, template: &str, vars: &HashMap<String, String>) -> Result<String> {
    substitute(template, vars).map_err(|name| {
        StepgraphError::ConfigError(format!(
            "step '{step}' uses unknown placeholder '{{{name}}}'"
        ))
    })
}

fn resolve_path(step: &str, template: &str, vars: &HashMap<String, String>) -> Result<PathBuf> {
    resolve(step, template, vars).map(PathBuf::from)
}

fn required<'a>(step: &str, field: &'a Option<String>, name: &str) -> Result<&'a str> {
    field.as_deref().ok_or_else(|| {
        StepgraphError::ConfigError(format!("step '{step}' is missing `{name}`"))
    })
}

fn step_decl(
    sc: &StepConfig,
    id: StepId,
    vars: &HashMap<String, String>,
    disabled: &Disabled,
    sequential_prev: Option<&StepId>,
) -> Result<StepDecl> {
    let operation = match sc.kind {
        StepKind::Command => {
            let program = resolve(&id, required(&id, &sc.run, "run")?, vars)?;
            let args = sc
                .args
                .iter()
                .map(|a| resolve(&id, a, vars))
                .collect::<Result<Vec<_>>>()?;
            Operation::Command { program, args }
        }
        StepKind::Mkdir => Operation::MakeDirs {
            paths: sc
                .paths
                .iter()
                .map(|p| resolve_path(&id, p, vars))
                .collect::<Result<Vec<_>>>()?,
        },
        StepKind::Copy => Operation::Copy {
            from: resolve_path(&id, required(&id, &sc.from, "from")?, vars)?,
            to: resolve_path(&id, required(&id, &sc.to, "to")?, vars)?,
        },
        StepKind::Symlink => Operation::Symlink {
            target: resolve_path(&id, required(&id, &sc.from, "from")?, vars)?,
            link: resolve_path(&id, required(&id, &sc.to, "to")?, vars)?,
        },
        StepKind::Barrier => Operation::Barrier,
    };

    let prereqs = prerequisites(sc, &id, vars, disabled, sequential_prev)?;
    let mut decl = StepDecl::new(operation).after_all(prereqs);

    for output in &sc.outputs {
        decl = decl.output(resolve_path(&id, output, vars)?);
    }

    Ok(decl.id(id))
}
