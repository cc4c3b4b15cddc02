//! Virtual file descriptors flowing through the destination pipeline.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

/// Readable byte source attached to a descriptor.
pub type ContentStream = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Writable byte sink handed out by filesystem backends.
pub type ContentSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Payload carried by a descriptor.
#[derive(Default)]
pub enum Contents {
    /// No contents; nothing is written for the descriptor.
    #[default]
    Null,
    /// Fully buffered bytes.
    Buffer(Vec<u8>),
    /// Sequential byte source consumed exactly once.
    Stream(ContentStream),
}

impl Contents {
    /// Wrap an async reader as streaming contents.
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Sync + Unpin + 'static,
    {
        Self::Stream(Box::new(reader))
    }

    /// Whether the descriptor carries no payload.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the payload is a stream.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }

    /// Buffered bytes, when the payload is a buffer.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer(bytes) => Some(bytes),
            Self::Null | Self::Stream(_) => None,
        }
    }
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Buffer(bytes) => f.debug_tuple("Buffer").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Vec<u8>> for Contents {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Buffer(bytes)
    }
}

impl From<&[u8]> for Contents {
    fn from(bytes: &[u8]) -> Self {
        Self::Buffer(bytes.to_vec())
    }
}

/// Optional metadata carried alongside a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    /// Desired permission bits for the entry.
    pub mode: Option<u32>,
    /// Whether the descriptor represents a directory.
    pub is_directory: bool,
}

impl FileStat {
    /// Metadata for a regular file.
    #[must_use]
    pub const fn file(mode: Option<u32>) -> Self {
        Self {
            mode,
            is_directory: false,
        }
    }

    /// Metadata for a directory.
    #[must_use]
    pub const fn directory(mode: Option<u32>) -> Self {
        Self {
            mode,
            is_directory: true,
        }
    }

    /// Capture metadata from an on-disk entry.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::PermissionsExt;
        Self {
            mode: Some(metadata.permissions().mode() & 0o7777),
            is_directory: metadata.is_dir(),
        }
    }
}

/// A virtual file: location triple, payload and optional metadata.
#[derive(Debug)]
pub struct FileDescriptor {
    /// Working directory the descriptor was created against.
    pub cwd: PathBuf,
    /// Root used to compute the relative path.
    pub base: PathBuf,
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Payload to write.
    pub contents: Contents,
    /// Optional metadata.
    pub stat: Option<FileStat>,
    /// Symlink target; when set the descriptor is materialised as a link.
    pub symlink: Option<PathBuf>,
}

impl FileDescriptor {
    /// Create a descriptor with an explicit base.
    pub fn new(cwd: impl Into<PathBuf>, base: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            base: base.into(),
            path: path.into(),
            contents: Contents::Null,
            stat: None,
            symlink: None,
        }
    }

    /// Create a descriptor whose base is its working directory.
    pub fn in_cwd(cwd: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Self {
        let cwd = cwd.into();
        Self::new(cwd.clone(), cwd, path)
    }

    /// Attach contents.
    #[must_use]
    pub fn with_contents(mut self, contents: impl Into<Contents>) -> Self {
        self.contents = contents.into();
        self
    }

    /// Attach metadata.
    #[must_use]
    pub const fn with_stat(mut self, stat: FileStat) -> Self {
        self.stat = Some(stat);
        self
    }

    /// Mark the descriptor as a symlink pointing at `target`.
    #[must_use]
    pub fn with_symlink(mut self, target: impl Into<PathBuf>) -> Self {
        self.symlink = Some(target.into());
        self
    }

    /// Path relative to `base`.
    ///
    /// Falls back to the file name when `path` does not live under `base`.
    #[must_use]
    pub fn relative(&self) -> PathBuf {
        let path = normalize(&self.path);
        let base = normalize(&self.base);
        match path.strip_prefix(&base) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_default(),
        }
    }

    /// Whether the metadata marks this descriptor as a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.stat.is_some_and(|stat| stat.is_directory)
    }

    /// Whether the descriptor has no contents.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.contents.is_null()
    }

    /// Desired mode from the metadata, if any.
    #[must_use]
    pub fn stat_mode(&self) -> Option<u32> {
        self.stat.and_then(|stat| stat.mode)
    }
}

/// Lexically normalise a path, folding `.` and `..` components.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
