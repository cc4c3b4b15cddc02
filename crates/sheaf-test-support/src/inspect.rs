//! On-disk inspection helpers for assertions.

use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Permission bits of an entry without following a trailing symlink.
///
/// # Errors
///
/// Returns an error if the entry cannot be inspected.
#[cfg(unix)]
pub fn real_mode(path: &Path) -> Result<u32> {
    Ok(std::fs::symlink_metadata(path)?.permissions().mode() & 0o7777)
}

/// Current process umask.
///
/// Linux exposes the mask in `/proc/self/status`, which avoids touching it
/// while other test threads create files. Elsewhere the mask is swapped out
/// and restored immediately.
#[cfg(unix)]
#[must_use]
pub fn current_umask() -> u32 {
    proc_status_umask().unwrap_or_else(swap_umask)
}

#[cfg(unix)]
fn proc_status_umask() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Umask:"))
        .and_then(|value| u32::from_str_radix(value.trim(), 8).ok())
}

#[cfg(unix)]
fn swap_umask() -> u32 {
    use nix::sys::stat::{Mode, umask};

    let previous = umask(Mode::empty());
    let _ = umask(previous);
    u32::from(previous.bits())
}

/// Mode a freshly created entry receives when asked for `requested`.
#[cfg(unix)]
#[must_use]
pub fn masked_by_umask(requested: u32) -> u32 {
    requested & !current_umask()
}

/// Sorted list of entries below `root`, relative to it.
///
/// # Errors
///
/// Returns an error if the tree cannot be traversed.
pub fn snapshot_tree(root: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        entries.push(entry.path().strip_prefix(root)?.to_path_buf());
    }
    Ok(entries)
}
