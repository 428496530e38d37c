//! Metadata describing a file written by a script.

use std::path::PathBuf;

use serde::Serialize;

/// Permission bits applied to files written by scripts.
pub const FILE_MODE: u32 = 0o644;

/// A completed write, handed to the host's post-write callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    /// Real path of the written file.
    pub path: PathBuf,
    /// Normalised virtual path the script wrote to.
    pub virtual_path: String,
    /// Permission bits requested for the file.
    pub mode: u32,
    /// Bytes written.
    pub size: u64,
    /// Lower-case hexadecimal SHA-256 of the contents.
    pub sha256: String,
}
