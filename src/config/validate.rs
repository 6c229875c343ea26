// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{PipelineFile, RawPipelineFile, StepConfig, StepKind};
use crate::config::template::{placeholders, ITEM_VAR, WORKDIR_VAR};
use crate::errors::{GraphError, Result, StepgraphError};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = StepgraphError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw.pipeline, raw.params, raw.step))
    }
}

fn validate_raw_pipeline(cfg: &RawPipelineFile) -> Result<()> {
    ensure_has_steps(cfg)?;
    validate_pipeline_section(cfg)?;
    validate_step_ids(cfg)?;
    for step in &cfg.step {
        validate_step_fields(step)?;
        validate_placeholders(cfg, step)?;
    }
    validate_references(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> StepgraphError {
    StepgraphError::ConfigError(msg.into())
}

fn ensure_has_steps(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.step.is_empty() {
        return Err(config_error(
            "pipeline must contain at least one [[step]] section",
        ));
    }
    Ok(())
}

fn validate_pipeline_section(cfg: &RawPipelineFile) -> Result<()> {
    if cfg.pipeline.jobs == 0 {
        return Err(config_error("[pipeline].jobs must be >= 1 (got 0)"));
    }
    if cfg.pipeline.working_dir.trim().is_empty() {
        return Err(config_error("[pipeline].working_dir must not be empty"));
    }
    Ok(())
}

fn validate_step_ids(cfg: &RawPipelineFile) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for step in &cfg.step {
        if step.id.trim().is_empty() {
            return Err(GraphError::EmptyId.into());
        }
        if step.id.contains(['[', ']']) {
            return Err(config_error(format!(
                "step id '{}' must not contain '[' or ']' (reserved for fan-out items)",
                step.id
            )));
        }
        if !seen.insert(step.id.as_str()) {
            return Err(GraphError::DuplicateStep(step.id.clone()).into());
        }
    }
    Ok(())
}

fn validate_step_fields(step: &StepConfig) -> Result<()> {
    let id = &step.id;
    match step.kind {
        StepKind::Command => {
            if step.run.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(config_error(format!(
                    "step '{id}' is a command step but has no `run` program"
                )));
            }
        }
        StepKind::Mkdir => {
            if step.paths.is_empty() {
                return Err(config_error(format!(
                    "step '{id}' is a mkdir step but has no `paths`"
                )));
            }
        }
        StepKind::Copy | StepKind::Symlink => {
            if step.from.is_none() || step.to.is_none() {
                return Err(config_error(format!(
                    "step '{id}' needs both `from` and `to`"
                )));
            }
        }
        StepKind::Barrier => {
            if step.each.is_some() {
                return Err(config_error(format!(
                    "barrier step '{id}' cannot fan out with `each`"
                )));
            }
            if step.after.as_ref().map(|a| a.is_empty()).unwrap_or(true) {
                return Err(config_error(format!(
                    "barrier step '{id}' must list the steps it waits for in `after`"
                )));
            }
        }
    }

    if step.kind != StepKind::Command && (step.run.is_some() || !step.args.is_empty()) {
        return Err(config_error(format!(
            "step '{id}' sets `run`/`args` but is not a command step"
        )));
    }

    Ok(())
}

fn validate_placeholders(cfg: &RawPipelineFile, step: &StepConfig) -> Result<()> {
    if let Some(flag) = &step.when {
        if !cfg.params.contains_key(flag) {
            return Err(config_error(format!(
                "step '{}' has `when = \"{}\"` but no such parameter exists",
                step.id, flag
            )));
        }
    }

    for field in step.templated_fields() {
        for name in placeholders(field) {
            let known = cfg.params.contains_key(name)
                || name == WORKDIR_VAR
                || (name == ITEM_VAR && step.each.is_some());
            if !known {
                return Err(config_error(format!(
                    "step '{}' uses unknown placeholder '{{{}}}'",
                    step.id, name
                )));
            }
        }
    }

    Ok(())
}

/// Step id an `after` entry refers to: `"ctf[{item}]"` → `"ctf"`.
pub(crate) fn referenced_base(entry: &str) -> &str {
    entry.split('[').next().unwrap_or(entry)
}

fn validate_references(cfg: &RawPipelineFile) -> Result<()> {
    let positions: HashMap<&str, usize> = cfg
        .step
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // Edge direction: prerequisite -> step.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for step in &cfg.step {
        graph.add_node(step.id.as_str());
    }

    for step in &cfg.step {
        for entry in step.after.iter().flatten() {
            let base = referenced_base(entry);
            if !placeholders(base).is_empty() {
                return Err(config_error(format!(
                    "step '{}' has `after` entry '{}': placeholders are only allowed inside [...]",
                    step.id, entry
                )));
            }
            if base == step.id {
                return Err(GraphError::SelfReference {
                    step: step.id.clone(),
                }
                .into());
            }
            let Some(&target) = positions.get(base) else {
                return Err(GraphError::UnknownPrerequisite {
                    step: step.id.clone(),
                    prerequisite: entry.clone(),
                }
                .into());
            };
            if entry.contains('[') && cfg.step[target].each.is_none() {
                return Err(config_error(format!(
                    "step '{}' refers to item '{}' but step '{}' has no `each`",
                    step.id, entry, base
                )));
            }
            graph.add_edge(base, step.id.as_str(), ());
        }
    }

    // A topological sort will fail if there is a cycle.
    if let Err(cycle) = toposort(&graph, None) {
        return Err(GraphError::Cycle(cycle.node_id().to_string()).into());
    }

    // Acyclic, but prerequisites must still be declared first.
    for (i, step) in cfg.step.iter().enumerate() {
        for entry in step.after.iter().flatten() {
            let base = referenced_base(entry);
            if positions[base] > i {
                return Err(GraphError::ForwardReference {
                    step: step.id.clone(),
                    prerequisite: base.to_string(),
                }
                .into());
            }
        }
    }

    Ok(())
}
