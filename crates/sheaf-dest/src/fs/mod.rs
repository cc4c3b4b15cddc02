//! Filesystem capability used by the destination pipeline.
//!
//! Every primitive the pipeline touches goes through [`FsBackend`] so tests can
//! substitute [`RecordingFs`] to count calls and inject faults.

mod local;
mod recording;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::model::{ContentSink, ContentStream};

pub use local::LocalFs;
pub use recording::{Fault, FsCall, FsOp, RecordingFs};

/// How a file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenPolicy {
    /// Create the file or truncate an existing one.
    Truncate,
    /// Create the file atomically; fail with `AlreadyExists` if any entry is present.
    CreateNew,
}

/// Metadata reported by [`FsBackend::stat`] and [`FsBackend::lstat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Full mode bits, including file type bits where the platform reports them.
    pub mode: u32,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry itself is a symbolic link.
    pub is_symlink: bool,
}

impl EntryMetadata {
    /// Permission portion of the mode (`0o7777`).
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Asynchronous filesystem primitives.
#[async_trait]
pub trait FsBackend: Send + Sync {
    /// Metadata following symlinks.
    async fn stat(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Metadata of the entry itself without following symlinks.
    async fn lstat(&self, path: &Path) -> io::Result<EntryMetadata>;

    /// Create a single directory. Fails with `NotFound` when the parent is
    /// missing and `AlreadyExists` when the entry exists.
    async fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Change permission bits.
    async fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// Open a file under `policy` and write `bytes`. `mode` applies on creation only.
    async fn write_file(
        &self,
        path: &Path,
        bytes: &[u8],
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<()>;

    /// Open a file under `policy` and return a sink for streaming writes.
    async fn create_file(
        &self,
        path: &Path,
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<ContentSink>;

    /// Open a file for sequential reading.
    async fn open_read(&self, path: &Path) -> io::Result<ContentStream>;

    /// Create a symbolic link at `link` pointing to `target`.
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Target of the symbolic link at `link`.
    async fn read_link(&self, link: &Path) -> io::Result<PathBuf>;

    /// Remove a non-directory entry.
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}
