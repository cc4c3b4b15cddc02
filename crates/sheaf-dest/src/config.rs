//! Destination options and their validation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sheaf_config::{DEFAULT_CONCURRENCY, MODE_MASK, ValidatedSettings};

use crate::error::{DestError, DestResult};
use crate::model::FileDescriptor;

type PathFn = dyn Fn(&FileDescriptor) -> PathBuf + Send + Sync;

/// A path option that is either fixed or computed per descriptor.
#[derive(Clone)]
pub enum PathSpec {
    /// Fixed path.
    Literal(PathBuf),
    /// Path derived from the descriptor being processed.
    Computed(Arc<PathFn>),
}

impl PathSpec {
    /// Build a computed spec from a closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&FileDescriptor) -> PathBuf + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(f))
    }

    /// Evaluate against a descriptor.
    #[must_use]
    pub fn evaluate(&self, file: &FileDescriptor) -> PathBuf {
        match self {
            Self::Literal(path) => path.clone(),
            Self::Computed(f) => f(file),
        }
    }

    fn literal_is_empty(&self) -> bool {
        matches!(self, Self::Literal(path) if path.as_os_str().is_empty())
    }
}

impl fmt::Debug for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(path) => f.debug_tuple("Literal").field(path).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for PathSpec {
    fn from(value: &str) -> Self {
        Self::Literal(PathBuf::from(value))
    }
}

impl From<String> for PathSpec {
    fn from(value: String) -> Self {
        Self::Literal(PathBuf::from(value))
    }
}

impl From<PathBuf> for PathSpec {
    fn from(value: PathBuf) -> Self {
        Self::Literal(value)
    }
}

impl From<&Path> for PathSpec {
    fn from(value: &Path) -> Self {
        Self::Literal(value.to_path_buf())
    }
}

/// User-facing destination options.
#[derive(Debug, Clone)]
pub struct DestinationConfig {
    /// Output root, fixed or per descriptor.
    pub folder: PathSpec,
    /// Directory the folder is resolved against. Defaults to the process cwd.
    pub cwd: Option<PathBuf>,
    /// Overrides the descriptor's output base.
    pub base: Option<PathSpec>,
    /// Default permission bits for files.
    pub mode: Option<u32>,
    /// Default permission bits for directories.
    pub dir_mode: Option<u32>,
    /// Replace existing entries.
    pub overwrite: bool,
    /// Maximum number of descriptors in flight.
    pub concurrency: usize,
}

impl DestinationConfig {
    /// Options writing into `folder` with defaults everywhere else.
    pub fn new(folder: impl Into<PathSpec>) -> Self {
        Self {
            folder: folder.into(),
            cwd: None,
            base: None,
            mode: None,
            dir_mode: None,
            overwrite: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the resolution directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Override the output base.
    #[must_use]
    pub fn with_base(mut self, base: impl Into<PathSpec>) -> Self {
        self.base = Some(base.into());
        self
    }

    /// Set the default file mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Set the default directory mode.
    #[must_use]
    pub const fn with_dir_mode(mut self, mode: u32) -> Self {
        self.dir_mode = Some(mode);
        self
    }

    /// Toggle replacement of existing entries.
    #[must_use]
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Bound the number of descriptors processed at once.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Build options from a validated settings document.
    #[must_use]
    pub fn from_settings(settings: &ValidatedSettings) -> Self {
        Self {
            folder: PathSpec::Literal(settings.folder.clone()),
            cwd: settings.cwd.clone(),
            base: settings.base.clone().map(PathSpec::Literal),
            mode: settings.mode,
            dir_mode: settings.dir_mode,
            overwrite: settings.overwrite,
            concurrency: settings.concurrency,
        }
    }

    /// Validate and freeze the options.
    ///
    /// # Errors
    ///
    /// Returns [`DestError::Configuration`] when the folder or base is an empty
    /// literal, a mode exceeds `0o7777`, concurrency is zero, or the process
    /// working directory cannot be determined.
    pub fn resolve(self) -> DestResult<ResolvedConfig> {
        if self.folder.literal_is_empty() {
            return Err(DestError::configuration("folder", "empty", None));
        }
        if self.base.as_ref().is_some_and(PathSpec::literal_is_empty) {
            return Err(DestError::configuration("base", "empty", None));
        }
        check_mode("mode", self.mode)?;
        check_mode("dir_mode", self.dir_mode)?;
        if self.concurrency == 0 {
            return Err(DestError::configuration(
                "concurrency",
                "must_be_positive",
                Some("0".to_string()),
            ));
        }

        let cwd = absolute_cwd(self.cwd)?;
        Ok(ResolvedConfig {
            folder: self.folder,
            cwd,
            base: self.base,
            mode: self.mode,
            dir_mode: self.dir_mode,
            overwrite: self.overwrite,
            concurrency: self.concurrency,
        })
    }
}

fn check_mode(field: &'static str, mode: Option<u32>) -> DestResult<()> {
    match mode {
        Some(value) if value & !MODE_MASK != 0 => Err(DestError::configuration(
            field,
            "out_of_range",
            Some(format!("{value:o}")),
        )),
        _ => Ok(()),
    }
}

fn absolute_cwd(cwd: Option<PathBuf>) -> DestResult<PathBuf> {
    match cwd {
        Some(path) if path.is_absolute() => Ok(path),
        other => {
            let process_cwd = std::env::current_dir()
                .map_err(|_| DestError::configuration("cwd", "unavailable", None))?;
            Ok(other.map_or_else(|| process_cwd.clone(), |rel| process_cwd.join(rel)))
        }
    }
}

/// Validated, immutable destination options.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Output root.
    pub folder: PathSpec,
    /// Absolute resolution directory.
    pub cwd: PathBuf,
    /// Base override.
    pub base: Option<PathSpec>,
    /// Default file mode.
    pub mode: Option<u32>,
    /// Default directory mode.
    pub dir_mode: Option<u32>,
    /// Replace existing entries.
    pub overwrite: bool,
    /// In-flight bound, at least one.
    pub concurrency: usize,
}
