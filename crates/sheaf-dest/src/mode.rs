//! Permission reconciliation.
//!
//! Desired modes come from the descriptor's `stat.mode` first, then the
//! configured file or directory mode. A chmod is only issued when the on-disk
//! permission bits differ from the desired ones.

use std::path::Path;

use sheaf_config::MODE_MASK;

use crate::config::ResolvedConfig;
use crate::error::{DestError, DestResult};
use crate::fs::FsBackend;
use crate::model::FileDescriptor;

/// setuid, setgid and sticky bits.
pub const SPECIAL_BITS: u32 = 0o7000;

/// Result of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSync {
    /// No mode was requested; the entry was not inspected.
    Unrequested,
    /// The entry already had the desired mode.
    Matched {
        /// Mode on disk.
        mode: u32,
    },
    /// The mode was changed.
    Changed {
        /// Permission bits before the change.
        from: u32,
        /// Permission bits applied.
        to: u32,
    },
}

impl ModeSync {
    /// Whether a chmod was issued.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Strip file type bits, keeping `0o7777`.
#[must_use]
pub const fn mask_mode(mode: u32) -> u32 {
    mode & MODE_MASK
}

/// Whether `current` satisfies `desired`.
///
/// Special bits on disk are ignored unless the desired mode sets any.
#[must_use]
pub const fn modes_match(desired: u32, current: u32) -> bool {
    let desired = mask_mode(desired);
    if desired & SPECIAL_BITS == 0 {
        desired == current & 0o777
    } else {
        desired == mask_mode(current)
    }
}

/// Mode `file` should end up with, if any.
#[must_use]
pub fn desired_mode(file: &FileDescriptor, config: &ResolvedConfig) -> Option<u32> {
    file.stat_mode().or(if file.is_directory() {
        config.dir_mode
    } else {
        config.mode
    })
}

/// Bring `path` to `desired`, issuing at most one stat and one chmod.
///
/// # Errors
///
/// Returns [`DestError::Stat`] when the entry cannot be inspected and
/// [`DestError::Chmod`] when the change is rejected.
pub async fn sync_mode(
    backend: &dyn FsBackend,
    path: &Path,
    desired: Option<u32>,
) -> DestResult<ModeSync> {
    let Some(desired) = desired.map(mask_mode) else {
        return Ok(ModeSync::Unrequested);
    };
    let current = backend
        .stat(path)
        .await
        .map_err(|err| DestError::stat(path, err))?
        .permissions();
    if modes_match(desired, current) {
        return Ok(ModeSync::Matched { mode: current });
    }
    backend
        .chmod(path, desired)
        .await
        .map_err(|err| DestError::chmod(path, desired, err))?;
    Ok(ModeSync::Changed {
        from: current,
        to: desired,
    })
}
