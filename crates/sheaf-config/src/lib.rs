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

//! Declarative settings for destination engines.
//!
//! Layout: model.rs (serialisable documents), validate.rs (parsing and
//! validation), loader.rs (JSON loading), error.rs (error types),
//! defaults.rs (shared defaults).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use defaults::{DEFAULT_CONCURRENCY, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, MODE_MASK};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_settings, parse_settings};
pub use model::{DestinationSettings, ValidatedSettings};
pub use validate::parse_octal_mode;
