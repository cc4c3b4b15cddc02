//! Default values shared by the settings document and the destination engine.
//!
//! # Design
//! - Keep permission defaults explicit so callers and tests agree on them.

/// Permission-relevant bits: owner/group/other rwx plus setuid, setgid and sticky.
pub const MODE_MASK: u32 = 0o7777;
/// Creation mode for files when neither the descriptor nor the settings supply one.
/// The process umask still applies.
pub const DEFAULT_FILE_MODE: u32 = 0o666;
/// Creation mode for directories when no directory mode is configured.
/// The process umask still applies.
pub const DEFAULT_DIR_MODE: u32 = 0o777;
/// Number of descriptors a destination processes concurrently by default.
pub const DEFAULT_CONCURRENCY: usize = 16;
