// src/exec/step_runner.rs

//! Individual step runner.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::dag::{Operation, ScheduledStep};
use crate::engine::{RuntimeEvent, StepOutcome};
use crate::errors::StepFailure;
use crate::exec::capture::{CapturedOutput, TailBuffer};
use crate::exec::command::build_command;
use crate::exec::{first_missing_output, internal};

/// What happened when a step was executed.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub outcome: StepOutcome,
    /// Exit code of the external process, if one ran to completion.
    pub exit_code: Option<i32>,
    pub output: CapturedOutput,
}

impl ExecutionReport {
    fn success(exit_code: Option<i32>, output: CapturedOutput) -> Self {
        Self {
            outcome: StepOutcome::Success,
            exit_code,
            output,
        }
    }

    fn failed(failure: StepFailure, exit_code: Option<i32>, output: CapturedOutput) -> Self {
        Self {
            outcome: StepOutcome::Failed(failure),
            exit_code,
            output,
        }
    }
}

/// Execute one step and report its completion to the runtime.
pub async fn run_step(
    step: ScheduledStep,
    working_dir: PathBuf,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let report = execute(&step, &working_dir).await;

    let event = RuntimeEvent::StepCompleted {
        step: step.id.clone(),
        outcome: report.outcome,
        output: report.output,
    };
    if runtime_tx.send(event).await.is_err() {
        warn!(step = %step.id, "runtime is gone; dropping step completion");
    }
}

/// Execute a step in `working_dir`.
///
/// A step succeeds only if its operation succeeds *and* every declared
/// output exists afterwards.
pub async fn execute(step: &ScheduledStep, working_dir: &Path) -> ExecutionReport {
    let report = match &step.operation {
        Operation::Command { program, args } => {
            run_command(&step.id, program, args, working_dir).await
        }
        Operation::Barrier => ExecutionReport::success(None, CapturedOutput::default()),
        op => {
            info!(step = %step.id, op = %op.display_line(), "running built-in operation");
            match internal::apply(op, working_dir).await {
                Ok(()) => ExecutionReport::success(None, CapturedOutput::default()),
                Err(failure) => ExecutionReport::failed(failure, None, CapturedOutput::default()),
            }
        }
    };

    if !matches!(report.outcome, StepOutcome::Success) {
        return report;
    }

    match first_missing_output(&step.outputs, working_dir) {
        None => report,
        Some(path) => {
            warn!(step = %step.id, path = ?path, "declared output missing after successful exit");
            ExecutionReport::failed(
                StepFailure::MissingOutput { path },
                report.exit_code,
                report.output,
            )
        }
    }
}

async fn run_command(
    id: &str,
    program: &str,
    args: &[String],
    working_dir: &Path,
) -> ExecutionReport {
    info!(step = %id, program = %program, args = ?args, "starting step process");

    let mut child = match build_command(program, args, working_dir).spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(step = %id, program = %program, error = %e, "failed to spawn process");
            return ExecutionReport::failed(
                StepFailure::Spawn {
                    program: program.to_string(),
                    message: e.to_string(),
                },
                None,
                CapturedOutput::default(),
            );
        }
    };

    // Drain both pipes concurrently so neither buffer fills up.
    let stdout = tokio::spawn(capture_lines(child.stdout.take(), id.to_string(), "stdout"));
    let stderr = tokio::spawn(capture_lines(child.stderr.take(), id.to_string(), "stderr"));

    let waited = wait_for(&mut child, id).await;

    let output = CapturedOutput {
        stdout: stdout.await.unwrap_or_default().into_lines(),
        stderr: stderr.await.unwrap_or_default().into_lines(),
    };

    let status = match waited {
        Ok(status) => status,
        Err(err) => {
            error!(step = %id, error = %err, "step process error");
            return ExecutionReport::failed(
                StepFailure::Internal {
                    message: format!("{err:#}"),
                },
                None,
                output,
            );
        }
    };

    // Killed by a signal: no exit code.
    let code = status.code().unwrap_or(-1);
    info!(step = %id, exit_code = code, success = status.success(), "step process exited");

    if status.success() {
        ExecutionReport::success(Some(code), output)
    } else {
        ExecutionReport::failed(StepFailure::ProcessFailure { exit_code: code }, Some(code), output)
    }
}

async fn wait_for(child: &mut tokio::process::Child, id: &str) -> anyhow::Result<ExitStatus> {
    child
        .wait()
        .await
        .with_context(|| format!("waiting for process of step '{id}'"))
}

async fn capture_lines<R>(reader: Option<R>, step: String, stream: &'static str) -> TailBuffer
where
    R: AsyncRead + Unpin,
{
    let mut tail = TailBuffer::default();
    let Some(reader) = reader else {
        return tail;
    };

    // Output is not required to be UTF-8, and the pipe must stay open until
    // the process closes it.
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
                debug!(step = %step, stream, "{}", line);
                tail.push(line);
            }
            Err(e) => {
                warn!(step = %step, stream, error = %e, "cannot read process output; discarding the rest");
                if let Err(e) = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await {
                    debug!(step = %step, stream, error = %e, "stopped draining process output");
                }
                break;
            }
        }
    }

    if tail.dropped() > 0 {
        debug!(step = %step, stream, dropped = tail.dropped(), "kept only the tail of the output");
    }
    tail
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
