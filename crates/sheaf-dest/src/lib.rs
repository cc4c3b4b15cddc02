#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Destination writer for virtual file descriptors.
//!
//! A [`Destination`] accepts a stream of [`FileDescriptor`]s, rebases each one
//! under a configured output folder, writes its contents (or symlink) to disk,
//! reconciles its permission bits and re-emits the updated descriptor.
//!
//! Layout: model/ (descriptor types), fs/ (filesystem capability), config.rs
//! (options and validation), resolve.rs (path rebasing), dirs.rs (recursive
//! directory creation), mode.rs (permission reconciliation), write.rs and
//! symlink.rs (materialisation), destination.rs (per-descriptor pipeline and
//! stream adapters).

pub mod config;
pub mod destination;
pub mod dirs;
pub mod error;
pub mod fs;
pub mod mode;
pub mod model;
pub mod resolve;
pub mod symlink;
pub mod write;

pub use config::{DestinationConfig, PathSpec, ResolvedConfig};
pub use destination::{Destination, DestinationHandle, Step, StepStatus};
pub use error::{DestError, DestResult};
pub use fs::{EntryMetadata, FsBackend, LocalFs, OpenPolicy, RecordingFs};
pub use model::{ContentSink, ContentStream, Contents, FileDescriptor, FileStat};
