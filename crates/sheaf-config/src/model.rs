//! Serialisable settings documents for destination engines.
//!
//! # Design
//! - Keep the wire shape close to the engine options (`folder`, `cwd`, `base`,
//!   `mode`, `dir_mode`, `overwrite`, `concurrency`).
//! - Modes travel as octal strings; [`DestinationSettings::validate`] parses them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Destination options as they appear in a settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationSettings {
    /// Destination root, absolute or relative to `cwd`.
    pub folder: String,
    /// Working directory used to resolve relative roots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Optional override for the base of written descriptors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    /// Octal mode for files that carry no mode of their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Octal mode for created directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_mode: Option<String>,
    /// Whether existing file content is replaced. Defaults to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
    /// Number of descriptors processed concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
}

/// Settings after parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    /// Destination root.
    pub folder: PathBuf,
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Base override.
    pub base: Option<PathBuf>,
    /// Parsed file mode.
    pub mode: Option<u32>,
    /// Parsed directory mode.
    pub dir_mode: Option<u32>,
    /// Overwrite policy.
    pub overwrite: bool,
    /// Concurrency bound.
    pub concurrency: usize,
}
