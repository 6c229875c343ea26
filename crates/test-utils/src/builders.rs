#![allow(dead_code)]

use stepgraph::config::{PipelineFile, PipelineSection, RawPipelineFile, StepConfig, StepKind};

/// Builder for `RawPipelineFile` to simplify test setup.
pub struct PipelineBuilder {
    pipeline: RawPipelineFile,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            pipeline: RawPipelineFile {
                pipeline: PipelineSection::default(),
                params: toml::Table::new(),
                step: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.pipeline.pipeline.name = Some(name.to_string());
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.pipeline.pipeline.jobs = jobs;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.pipeline.pipeline.sequential = true;
        self
    }

    pub fn param(mut self, name: &str, value: impl Into<toml::Value>) -> Self {
        self.pipeline.params.insert(name.to_string(), value.into());
        self
    }

    pub fn step(mut self, step: StepBuilder) -> Self {
        self.pipeline.step.push(step.build());
        self
    }

    pub fn raw(self) -> RawPipelineFile {
        self.pipeline
    }

    pub fn build(self) -> PipelineFile {
        PipelineFile::try_from(self.pipeline).expect("Failed to build valid pipeline from builder")
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepBuilder {
    step: StepConfig,
}

impl StepBuilder {
    fn blank(id: &str, kind: StepKind) -> Self {
        Self {
            step: StepConfig {
                id: id.to_string(),
                kind,
                run: None,
                args: vec![],
                paths: vec![],
                from: None,
                to: None,
                after: None,
                outputs: vec![],
                each: None,
                when: None,
            },
        }
    }

    /// External command step.
    pub fn command(id: &str, program: &str) -> Self {
        let mut b = Self::blank(id, StepKind::Command);
        b.step.run = Some(program.to_string());
        b
    }

    pub fn mkdir(id: &str, paths: &[&str]) -> Self {
        let mut b = Self::blank(id, StepKind::Mkdir);
        b.step.paths = paths.iter().map(|p| p.to_string()).collect();
        b
    }

    pub fn copy(id: &str, from: &str, to: &str) -> Self {
        let mut b = Self::blank(id, StepKind::Copy);
        b.step.from = Some(from.to_string());
        b.step.to = Some(to.to_string());
        b
    }

    pub fn symlink(id: &str, from: &str, to: &str) -> Self {
        let mut b = Self::blank(id, StepKind::Symlink);
        b.step.from = Some(from.to_string());
        b.step.to = Some(to.to_string());
        b
    }

    pub fn barrier(id: &str, after: &[&str]) -> Self {
        Self::blank(id, StepKind::Barrier).after_all(after)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.step.args.push(arg.to_string());
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.step.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.step
            .after
            .get_or_insert_with(Vec::new)
            .push(dep.to_string());
        self
    }

    pub fn after_all(mut self, deps: &[&str]) -> Self {
        let after = self.step.after.get_or_insert_with(Vec::new);
        after.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    /// Explicitly no prerequisites (`after = []`), even in sequential
    /// pipelines.
    pub fn no_after(mut self) -> Self {
        self.step.after = Some(vec![]);
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.step.outputs.push(path.to_string());
        self
    }

    pub fn each(mut self, items: &[&str]) -> Self {
        self.step.each = Some(items.iter().map(|i| i.to_string()).collect());
        self
    }

    pub fn when(mut self, param: &str) -> Self {
        self.step.when = Some(param.to_string());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}
