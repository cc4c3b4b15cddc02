//! Error types for settings operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for settings operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid destination setting")]
    InvalidField {
        /// Field that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Settings file could not be read.
    #[error("failed to read destination settings")]
    Io {
        /// Path of the settings document.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Settings document was not valid JSON for the expected shape.
    #[error("failed to parse destination settings")]
    Json {
        /// Path of the settings document, when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: &'static str, value: Option<&str>) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: value.map(str::to_string),
        }
    }

    /// Field name for validation failures.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidField { field, .. } => Some(field),
            Self::Io { .. } | Self::Json { .. } => None,
        }
    }
}
