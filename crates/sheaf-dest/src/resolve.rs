//! Rebasing descriptors under the output folder.

use std::path::PathBuf;

use crate::config::ResolvedConfig;
use crate::error::{DestError, DestResult};
use crate::model::{FileDescriptor, normalize};

/// New location for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    /// Absolute resolution directory.
    pub cwd: PathBuf,
    /// Absolute output base.
    pub base: PathBuf,
    /// Absolute output path.
    pub path: PathBuf,
}

impl ResolvedLocation {
    /// Move the descriptor to this location.
    #[must_use]
    pub fn apply(self, mut file: FileDescriptor) -> FileDescriptor {
        file.cwd = self.cwd;
        file.base = self.base;
        file.path = self.path;
        file
    }
}

/// Compute where `file` lands.
///
/// The output base is `cwd` joined with the base override (or the folder), and
/// the output path is that base joined with the descriptor's relative path.
///
/// # Errors
///
/// Returns [`DestError::Configuration`] when a computed folder or base yields an
/// empty path.
pub fn resolve_location(file: &FileDescriptor, config: &ResolvedConfig) -> DestResult<ResolvedLocation> {
    let root = config.folder.evaluate(file);
    if root.as_os_str().is_empty() {
        return Err(DestError::configuration("folder", "empty", None));
    }
    let base_dir = match &config.base {
        Some(spec) => {
            let base = spec.evaluate(file);
            if base.as_os_str().is_empty() {
                return Err(DestError::configuration("base", "empty", None));
            }
            base
        }
        None => root,
    };

    let base = normalize(&config.cwd.join(base_dir));
    let path = normalize(&base.join(file.relative()));
    Ok(ResolvedLocation {
        cwd: config.cwd.clone(),
        base,
        path,
    })
}
