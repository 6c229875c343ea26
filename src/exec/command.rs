// src/exec/command.rs

//! Process invocation builder.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Build the invocation for `program` with discrete argument tokens.
///
/// No shell is involved: every token reaches the program verbatim. The child
/// runs in `working_dir` with stdout/stderr piped and is killed if its handle
/// is dropped.
///
/// On unix the child leads its own process group, so a terminal Ctrl-C
/// reaches only stepgraph, which then stops dispatching and lets running
/// steps finish.
pub fn build_command(program: &str, args: &[String], working_dir: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}
