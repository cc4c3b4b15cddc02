//! Loading settings documents from JSON text or files.

use std::path::Path;

use tracing::info;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{DestinationSettings, ValidatedSettings};

/// Parse and validate a JSON settings document.
///
/// # Errors
///
/// Returns [`ConfigError::Json`] for malformed documents and
/// [`ConfigError::InvalidField`] for documents that fail validation.
pub fn parse_settings(document: &str) -> ConfigResult<ValidatedSettings> {
    let settings: DestinationSettings = serde_json::from_str(document)
        .map_err(|source| ConfigError::Json { path: None, source })?;
    settings.validate()
}

/// Read, parse and validate a JSON settings file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the
/// errors of [`parse_settings`].
pub async fn load_settings(path: &Path) -> ConfigResult<ValidatedSettings> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let settings: DestinationSettings =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: Some(path.to_path_buf()),
            source,
        })?;
    let validated = settings.validate()?;
    info!(path = %path.display(), "loaded destination settings");
    Ok(validated)
}
