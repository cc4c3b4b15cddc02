use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{EntryMetadata, FsBackend, OpenPolicy};
use crate::model::{ContentSink, ContentStream};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// [`FsBackend`] over the host filesystem via `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    /// Construct the local backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn entry_metadata(metadata: &std::fs::Metadata) -> EntryMetadata {
    #[cfg(unix)]
    let mode = metadata.permissions().mode();
    #[cfg(not(unix))]
    let mode = if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    };
    EntryMetadata {
        mode,
        is_dir: metadata.is_dir(),
        is_symlink: metadata.file_type().is_symlink(),
    }
}

fn open_options(mode: u32, policy: OpenPolicy) -> fs::OpenOptions {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    match policy {
        OpenPolicy::Truncate => {
            options.create(true).truncate(true);
        }
        OpenPolicy::CreateNew => {
            options.create_new(true);
        }
    }
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    options
}

#[async_trait]
impl FsBackend for LocalFs {
    async fn stat(&self, path: &Path) -> io::Result<EntryMetadata> {
        fs::metadata(path).await.map(|meta| entry_metadata(&meta))
    }

    async fn lstat(&self, path: &Path) -> io::Result<EntryMetadata> {
        fs::symlink_metadata(path)
            .await
            .map(|meta| entry_metadata(&meta))
    }

    async fn mkdir(&self, path: &Path, mode: u32) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        #[cfg(unix)]
        builder.mode(mode);
        #[cfg(not(unix))]
        let _ = mode;
        builder.create(path).await
    }

    #[cfg(unix)]
    async fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
    }

    #[cfg(not(unix))]
    async fn chmod(&self, _path: &Path, _mode: u32) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "permission bits are not supported on this platform",
        ))
    }

    async fn write_file(
        &self,
        path: &Path,
        bytes: &[u8],
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<()> {
        let mut file = open_options(mode, policy).open(path).await?;
        file.write_all(bytes).await?;
        file.flush().await
    }

    async fn create_file(
        &self,
        path: &Path,
        mode: u32,
        policy: OpenPolicy,
    ) -> io::Result<ContentSink> {
        let file = open_options(mode, policy).open(path).await?;
        Ok(Box::new(file))
    }

    async fn open_read(&self, path: &Path) -> io::Result<ContentStream> {
        let file = fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    #[cfg(unix)]
    async fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        fs::symlink(target, link).await
    }

    #[cfg(not(unix))]
    async fn symlink(&self, _target: &Path, _link: &Path) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "symbolic links are not supported on this platform",
        ))
    }

    async fn read_link(&self, link: &Path) -> io::Result<PathBuf> {
        fs::read_link(link).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }
}
