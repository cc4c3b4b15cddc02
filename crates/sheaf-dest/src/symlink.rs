//! Symbolic link creation.

use std::io;
use std::path::Path;

use crate::error::{DestError, DestResult};
use crate::fs::FsBackend;

/// What [`create_symlink`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymlinkOutcome {
    /// The link was created.
    Created,
    /// A file or a link to another target was replaced.
    Replaced,
    /// A link to the same target was already in place.
    Unchanged,
    /// An entry already existed and overwrite is disabled.
    Skipped,
}

impl SymlinkOutcome {
    /// Whether the link path was modified.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Replaced)
    }
}

/// Create a link at `link` pointing to `target`.
///
/// The target is used verbatim and may be relative or dangling. With
/// `overwrite` enabled an existing file or link is replaced; a directory in
/// the way is a conflict.
///
/// # Errors
///
/// Returns [`DestError::Write`] when the link cannot be created or the entry
/// in its place cannot be inspected or removed.
pub async fn create_symlink(
    backend: &dyn FsBackend,
    target: &Path,
    link: &Path,
    overwrite: bool,
) -> DestResult<SymlinkOutcome> {
    let err = match backend.symlink(target, link).await {
        Ok(()) => return Ok(SymlinkOutcome::Created),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => err,
        Err(err) => return Err(DestError::write("symlink", link, err)),
    };
    if !overwrite {
        return Ok(SymlinkOutcome::Skipped);
    }

    let existing = backend
        .lstat(link)
        .await
        .map_err(|err| DestError::write("symlink.inspect", link, err))?;
    if existing.is_symlink {
        let current = backend
            .read_link(link)
            .await
            .map_err(|err| DestError::write("symlink.inspect", link, err))?;
        if current == target {
            return Ok(SymlinkOutcome::Unchanged);
        }
    } else if existing.is_dir {
        return Err(DestError::write("symlink", link, err));
    }

    backend
        .remove_file(link)
        .await
        .map_err(|err| DestError::write("symlink.remove", link, err))?;
    backend
        .symlink(target, link)
        .await
        .map_err(|err| DestError::write("symlink", link, err))?;
    Ok(SymlinkOutcome::Replaced)
}
