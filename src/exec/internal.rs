// src/exec/internal.rs

//! Built-in file operations (`mkdir`, `copy`, `symlink`).

use std::io;
use std::path::Path;

use tracing::debug;

use crate::dag::Operation;
use crate::errors::StepFailure;
use crate::exec::resolve_in;

/// Apply a built-in operation inside `working_dir`.
///
/// Commands and barriers are not built-in operations and succeed without
/// doing anything here.
pub async fn apply(operation: &Operation, working_dir: &Path) -> Result<(), StepFailure> {
    match operation {
        Operation::MakeDirs { paths } => {
            for path in paths {
                let dir = resolve_in(working_dir, path);
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| failure("creating directory", &dir, e))?;
                debug!(dir = ?dir, "created directory");
            }
            Ok(())
        }
        Operation::Copy { from, to } => {
            let src = resolve_in(working_dir, from);
            let dest = resolve_in(working_dir, to);
            tokio::fs::copy(&src, &dest)
                .await
                .map_err(|e| failure(&format!("copying {} to", src.display()), &dest, e))?;
            debug!(from = ?src, to = ?dest, "copied file");
            Ok(())
        }
        Operation::Symlink { target, link } => {
            let target = resolve_in(working_dir, target);
            let link = resolve_in(working_dir, link);

            // An existing link to the same target is left alone; anything
            // else at `link` is never replaced.
            if tokio::fs::symlink_metadata(&link).await.is_ok() {
                return match tokio::fs::read_link(&link).await {
                    Ok(existing) if existing == target => Ok(()),
                    _ => Err(StepFailure::Internal {
                        message: format!("refusing to replace existing path {}", link.display()),
                    }),
                };
            }

            make_symlink(&target, &link)
                .await
                .map_err(|e| failure("creating symlink", &link, e))?;
            debug!(target = ?target, link = ?link, "created symlink");
            Ok(())
        }
        Operation::Command { .. } | Operation::Barrier => Ok(()),
    }
}

#[cfg(unix)]
async fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    tokio::fs::symlink_file(target, link).await
}

fn failure(action: &str, path: &Path, err: io::Error) -> StepFailure {
    StepFailure::Internal {
        message: format!("{action} {}: {err}", path.display()),
    }
}
