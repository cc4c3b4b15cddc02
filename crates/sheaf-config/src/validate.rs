//! Validation helpers and parsing utilities for settings documents.

use std::path::PathBuf;

use tracing::debug;

use crate::defaults::{DEFAULT_CONCURRENCY, MODE_MASK};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{DestinationSettings, ValidatedSettings};

/// Parse an octal permission string such as `755`, `0755` or `0o755`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is empty, not octal, or
/// carries bits outside the permission range.
pub fn parse_octal_mode(field: &'static str, value: &str) -> ConfigResult<u32> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0o").unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(ConfigError::invalid(field, "empty", Some(value)));
    }
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|_| ConfigError::invalid(field, "invalid_octal", Some(value)))?;
    if mode & !MODE_MASK != 0 {
        return Err(ConfigError::invalid(field, "out_of_range", Some(value)));
    }
    Ok(mode)
}

fn non_empty_path(field: &'static str, value: &str) -> ConfigResult<PathBuf> {
    if value.trim().is_empty() {
        return Err(ConfigError::invalid(field, "empty", Some(value)));
    }
    Ok(PathBuf::from(value))
}

impl DestinationSettings {
    /// Validate the document and parse its octal modes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<ValidatedSettings> {
        let folder = non_empty_path("folder", &self.folder)?;
        let cwd = self
            .cwd
            .as_deref()
            .map(|value| non_empty_path("cwd", value))
            .transpose()?;
        let base = self
            .base
            .as_deref()
            .map(|value| non_empty_path("base", value))
            .transpose()?;
        let mode = self
            .mode
            .as_deref()
            .map(|value| parse_octal_mode("mode", value))
            .transpose()?;
        let dir_mode = self
            .dir_mode
            .as_deref()
            .map(|value| parse_octal_mode("dir_mode", value))
            .transpose()?;
        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            return Err(ConfigError::invalid(
                "concurrency",
                "must_be_positive",
                Some("0"),
            ));
        }

        debug!(
            folder = %folder.display(),
            overwrite = self.overwrite.unwrap_or(true),
            concurrency,
            "destination settings validated"
        );

        Ok(ValidatedSettings {
            folder,
            cwd,
            base,
            mode,
            dir_mode,
            overwrite: self.overwrite.unwrap_or(true),
            concurrency,
        })
    }
}
