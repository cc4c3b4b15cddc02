//! # Design
//!
//! - Provide structured, constant-message errors for the destination pipeline.
//! - Capture the failing path and operation so failures are reproducible in tests.
//! - Preserve the underlying IO error untouched; callers read its code and
//!   message through [`DestError::io_error`] and [`DestError::raw_os_error`].

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for destination operations.
pub type DestResult<T> = Result<T, DestError>;

/// Errors produced while materialising descriptors.
#[derive(Debug, Error)]
pub enum DestError {
    /// The destination configuration is unusable. Fatal to the whole engine.
    #[error("destination configuration invalid")]
    Configuration {
        /// Option that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// A directory could not be created for reasons other than pre-existence.
    #[error("destination directory creation failed")]
    DirectoryCreation {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Metadata query failed during mode reconciliation.
    #[error("destination stat failed")]
    Stat {
        /// Entry that could not be inspected.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Content write or symlink creation failed.
    #[error("destination write failed")]
    Write {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Permission change failed.
    #[error("destination chmod failed")]
    Chmod {
        /// Entry whose mode could not be changed.
        path: PathBuf,
        /// Mode that was requested.
        mode: u32,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl DestError {
    pub(crate) fn configuration(
        field: &'static str,
        reason: &'static str,
        value: Option<String>,
    ) -> Self {
        Self::Configuration {
            field,
            reason,
            value,
        }
    }

    pub(crate) fn directory(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::DirectoryCreation {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn stat(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Stat {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::Write {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn chmod(path: impl Into<PathBuf>, mode: u32, source: io::Error) -> Self {
        Self::Chmod {
            path: path.into(),
            mode,
            source,
        }
    }

    /// Whether the error invalidates the whole engine rather than one descriptor.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Machine-friendly label for logs and metrics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::DirectoryCreation { .. } => "directory_creation",
            Self::Stat { .. } => "stat",
            Self::Write { .. } => "write",
            Self::Chmod { .. } => "chmod",
        }
    }

    /// Underlying IO error, passed through verbatim.
    #[must_use]
    pub const fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Configuration { .. } => None,
            Self::DirectoryCreation { source, .. }
            | Self::Stat { source, .. }
            | Self::Write { source, .. }
            | Self::Chmod { source, .. } => Some(source),
        }
    }

    /// OS error code of the underlying failure, when it came from the OS.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.io_error().and_then(io::Error::raw_os_error)
    }

    /// Path the failure relates to.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Configuration { .. } => None,
            Self::DirectoryCreation { path, .. }
            | Self::Stat { path, .. }
            | Self::Write { path, .. }
            | Self::Chmod { path, .. } => Some(path),
        }
    }
}
