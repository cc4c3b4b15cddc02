//! Scratch directories and sample payloads.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

/// Contents used wherever a test needs a realistic source file.
pub const SAMPLE_SOURCE: &[u8] = b"square = (x) -> x * x\n\nmath =\n  root: Math.sqrt\n  square: square\n";

/// Scratch workspace laid out like a project: `fixtures/` holds inputs and
/// `out-fixtures/` is where destinations write.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace with an empty `fixtures/` directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("sheaf-").tempdir()?;
        fs::create_dir_all(dir.path().join("fixtures"))?;
        Ok(Self { dir })
    }

    /// Absolute root of the workspace, used as `cwd` by tests.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of an input fixture.
    #[must_use]
    pub fn fixture(&self, relative: &str) -> PathBuf {
        self.root().join("fixtures").join(relative)
    }

    /// Absolute `fixtures/` directory.
    #[must_use]
    pub fn fixtures_dir(&self) -> PathBuf {
        self.root().join("fixtures")
    }

    /// Absolute `out-fixtures/` directory.
    #[must_use]
    pub fn out_dir(&self) -> PathBuf {
        self.root().join("out-fixtures")
    }

    /// Absolute path of an output entry.
    #[must_use]
    pub fn output(&self, relative: &str) -> PathBuf {
        self.out_dir().join(relative)
    }

    /// Write an input fixture, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the fixture cannot be written.
    pub fn write_fixture(&self, relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.fixture(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Pre-populate an output file, creating `out-fixtures/` as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_output(&self, relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.output(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }
}
