//! Content materialisation.

use std::io;
use std::mem;

use sheaf_config::DEFAULT_FILE_MODE;
use tokio::io::AsyncWriteExt;

use crate::error::{DestError, DestResult};
use crate::fs::{FsBackend, OpenPolicy};
use crate::model::{Contents, FileDescriptor};

/// How content is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Mode applied when the file is created (subject to the umask).
    pub creation_mode: u32,
    /// Replace existing files.
    pub overwrite: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            creation_mode: DEFAULT_FILE_MODE,
            overwrite: true,
        }
    }
}

/// What [`write_contents`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Directory descriptor; nothing to write.
    Directory,
    /// No contents; nothing was written.
    Null,
    /// Content was written.
    Written {
        /// Bytes written.
        bytes: u64,
    },
    /// An entry already existed and overwrite is disabled.
    Skipped,
}

impl WriteOutcome {
    /// Whether an on-disk entry exists at the target after the step.
    #[must_use]
    pub const fn has_target(self) -> bool {
        !matches!(self, Self::Null)
    }
}

/// Write `file.contents` to `file.path`.
///
/// Streamed contents are drained to disk and replaced by a fresh reader over
/// the written file. With overwrite disabled the target is opened exclusively
/// and an existing entry of any kind leaves the contents untouched.
///
/// # Errors
///
/// Returns [`DestError::Write`] when the target cannot be created, written,
/// closed or reopened.
pub async fn write_contents(
    backend: &dyn FsBackend,
    file: &mut FileDescriptor,
    options: WriteOptions,
) -> DestResult<WriteOutcome> {
    if file.is_directory() {
        return Ok(WriteOutcome::Directory);
    }
    if file.is_null() {
        return Ok(WriteOutcome::Null);
    }

    let path = file.path.clone();
    let policy = if options.overwrite {
        OpenPolicy::Truncate
    } else {
        OpenPolicy::CreateNew
    };

    match mem::take(&mut file.contents) {
        Contents::Buffer(bytes) => {
            let result = backend
                .write_file(&path, &bytes, options.creation_mode, policy)
                .await;
            let written = bytes.len() as u64;
            file.contents = Contents::Buffer(bytes);
            match result {
                Ok(()) => Ok(WriteOutcome::Written { bytes: written }),
                Err(err) if already_exists(policy, &err) => Ok(WriteOutcome::Skipped),
                Err(err) => Err(DestError::write("write.buffer", &path, err)),
            }
        }
        Contents::Stream(mut reader) => {
            let mut sink = match backend
                .create_file(&path, options.creation_mode, policy)
                .await
            {
                Ok(sink) => sink,
                Err(err) if already_exists(policy, &err) => {
                    file.contents = Contents::Stream(reader);
                    return Ok(WriteOutcome::Skipped);
                }
                Err(err) => return Err(DestError::write("write.create", &path, err)),
            };
            let written = tokio::io::copy(&mut reader, &mut sink)
                .await
                .map_err(|err| DestError::write("write.stream", &path, err))?;
            sink.shutdown()
                .await
                .map_err(|err| DestError::write("write.close", &path, err))?;
            drop(sink);
            file.contents = Contents::Stream(
                backend
                    .open_read(&path)
                    .await
                    .map_err(|err| DestError::write("write.reopen", &path, err))?,
            );
            Ok(WriteOutcome::Written { bytes: written })
        }
        Contents::Null => Ok(WriteOutcome::Null),
    }
}

fn already_exists(policy: OpenPolicy, err: &io::Error) -> bool {
    policy == OpenPolicy::CreateNew && err.kind() == io::ErrorKind::AlreadyExists
}
