use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{EntryMetadata, FsBackend, LocalFs, OpenPolicy};
use crate::model::{ContentSink, ContentStream};

/// Filesystem primitive recorded by [`RecordingFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    /// `stat`.
    Stat,
    /// `lstat`.
    Lstat,
    /// `mkdir`.
    Mkdir,
    /// `chmod`.
    Chmod,
    /// `write_file`.
    WriteFile,
    /// `create_file`.
    CreateFile,
    /// `open_read`.
    OpenRead,
    /// `symlink`.
    Symlink,
    /// `read_link`.
    ReadLink,
    /// `remove_file`.
    RemoveFile,
}

impl FsOp {
    /// Stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stat => "stat",
            Self::Lstat => "lstat",
            Self::Mkdir => "mkdir",
            Self::Chmod => "chmod",
            Self::WriteFile => "write_file",
            Self::CreateFile => "create_file",
            Self::OpenRead => "open_read",
            Self::Symlink => "symlink",
            Self::ReadLink => "read_link",
            Self::RemoveFile => "remove_file",
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCall {
    /// Primitive invoked.
    pub op: FsOp,
    /// Path argument (the link path for symlinks).
    pub path: PathBuf,
    /// Mode argument, when the primitive takes one.
    pub mode: Option<u32>,
}

/// Error injected in place of a primitive's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// OS error with the given raw code.
    Os(i32),
    /// Custom error carrying a message.
    Message(String),
}

impl Fault {
    fn to_error(&self) -> io::Error {
        match self {
            Self::Os(code) => io::Error::from_raw_os_error(*code),
            Self::Message(message) => io::Error::other(message.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct FaultRule {
    op: FsOp,
    path: Option<PathBuf>,
    fault: Fault,
}

/// Backend decorator that records every call and can fail selected ones.
///
/// Faulted calls are still recorded.
pub struct RecordingFs {
    inner: Arc<dyn FsBackend>,
    calls: Mutex<Vec<FsCall>>,
    faults: Mutex<Vec<FaultRule>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingFs {
    /// Wrap an existing backend.
    #[must_use]
    pub fn new(inner: Arc<dyn FsBackend>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Wrap the local filesystem.
    #[must_use]
    pub fn local() -> Self {
        Self::new(Arc::new(LocalFs::new()))
    }

    /// Fail `op`. With `path` set, only calls on that path fail.
    pub fn fail(&self, op: FsOp, path: Option<&Path>, fault: Fault) {
        lock(&self.faults).push(FaultRule {
            op,
            path: path.map(Path::to_path_buf),
            fault,
        });
    }

    /// Remove all injected faults.
    pub fn clear_faults(&self) {
        lock(&self.faults).clear();
    }

    /// Snapshot of recorded calls in invocation order.
    #[must_use]
    pub fn calls(&self) -> Vec<FsCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded calls for `op`, optionally restricted to `path`.
    #[must_use]
    pub fn count(&self, op: FsOp, path: Option<&Path>) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op == op && path.is_none_or(|p| call.path.as_path() == p))
            .count()
    }

    /// Forget recorded calls.
    pub fn reset(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, op: FsOp, path: &Path, mode: Option<u32>) -> io::Result<()> {
        lock(&self.calls).push(FsCall {
            op,
            path: path.to_path_buf(),
            mode,
        });
        lock(&self.faults)
            .iter()
            .find(|rule| rule.op == op && rule.path.as_deref().is_none_or(|p| p == path))
            .map_or(Ok(()), |rule| Err(rule.fault.to_error()))
    }
}

impl std::fmt::Debug for RecordingFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingFs")
            .field("calls", &lock(&self.calls).len())
            .field("faults", &lock(&self.faults).len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl FsBackend for RecordingFs {
    async fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.record(FsOp::Stat, path, None)?;
        self.inner.stat(path).await
    }

    async fn lstat(&self, path: &Path) -> io::Result<EntryMetadata> {
        self.record(FsOp::Lstat, path, None)?;
        self.inner.lstat(path).await
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record(FsOp::Mkdir, path, Some(mode))?;
        self.inner.mkdir(path, mode).await
    }

    async fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.record(FsOp::Chmod, path, Some(mode))?;
        self.inner.chmod(path, mode).await
    }

    async fn write_file(
        &self,
        path: &Path,
        bytes: &[u8],
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<()> {
        self.record(FsOp::WriteFile, path, Some(mode))?;
        self.inner.write_file(path, bytes, mode, policy).await
    }

    async fn create_file(
        &self,
        path: &Path,
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<ContentSink> {
        self.record(FsOp::CreateFile, path, Some(mode))?;
        self.inner.create_file(path, mode, policy).await
    }

    async fn open_read(&self, path: &Path) -> io::Result<ContentStream> {
        self.record(FsOp::OpenRead, path, None)?;
        self.inner.open_read(path).await
    }

    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.record(FsOp::Symlink, link, None)?;
        self.inner.symlink(target, link).await
    }

    async fn read_link(&self, link: &Path) -> io::Result<PathBuf> {
        self.record(FsOp::ReadLink, link, None)?;
        self.inner.read_link(link).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(FsOp::RemoveFile, path, None)?;
        self.inner.remove_file(path).await
    }
}
