//! Recursive directory creation.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DestError, DestResult};
use crate::fs::FsBackend;

/// Create `dir` and any missing ancestors with `mode`.
///
/// Succeeds when the directory already exists, including when another task
/// creates it concurrently. Existing directories keep their mode.
///
/// # Errors
///
/// Returns [`DestError::DirectoryCreation`] when a component cannot be created
/// or exists as a non-directory.
pub async fn ensure_directory(backend: &dyn FsBackend, dir: &Path, mode: u32) -> DestResult<()> {
    let mut pending: Vec<PathBuf> = Vec::new();
    let mut current = dir.to_path_buf();

    loop {
        match backend.mkdir(&current, mode).await {
            Ok(()) => break,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                confirm_directory(backend, &current, err).await?;
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let Some(parent) = current.parent().map(Path::to_path_buf) else {
                    return Err(DestError::directory(current, err));
                };
                if parent.as_os_str().is_empty() {
                    return Err(DestError::directory(current, err));
                }
                pending.push(current);
                current = parent;
            }
            Err(err) => return Err(DestError::directory(current, err)),
        }
    }

    while let Some(next) = pending.pop() {
        match backend.mkdir(&next, mode).await {
            Ok(()) => debug!(path = %next.display(), mode = %format!("{mode:o}"), "created directory"),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                confirm_directory(backend, &next, err).await?;
            }
            Err(err) => return Err(DestError::directory(next, err)),
        }
    }
    Ok(())
}

/// Create the parent directory of `path`.
///
/// # Errors
///
/// See [`ensure_directory`].
pub async fn ensure_parent(backend: &dyn FsBackend, path: &Path, mode: u32) -> DestResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            ensure_directory(backend, parent, mode).await
        }
        _ => Ok(()),
    }
}

async fn confirm_directory(
    backend: &dyn FsBackend,
    path: &Path,
    original: io::Error,
) -> DestResult<()> {
    match backend.stat(path).await {
        Ok(meta) if meta.is_dir => Ok(()),
        _ => Err(DestError::directory(path, original)),
    }
}
