//! Error types for composition-file decoding

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading a composition file
///
/// None of these are recovered from inside the reader: the first one aborts
/// the load and is handed back to the caller.
#[derive(Debug, Error)]
pub enum CKError {
    /// The file could not be opened or mapped
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Path that was being opened
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Load options failed validation
    #[error("invalid load options: {0}")]
    InvalidOptions(String),

    /// Magic marker absent, a header segment truncated, or a structurally
    /// impossible value in the directory
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// Declared format version is newer than this reader understands
    #[error("unsupported file version {version} (newest supported is {max})")]
    UnsupportedVersion {
        /// Version word read from the primary header
        version: u32,
        /// Newest version accepted by the active options
        max: u32,
    },

    /// Recomputed Adler-32 does not match the stored value
    #[error("checksum mismatch: stored {expected:#010X}, computed {actual:#010X}")]
    ChecksumError {
        /// Checksum stored in the file
        expected: u32,
        /// Checksum computed over the file contents
        actual: u32,
    },

    /// Inflate failed or produced a length other than the declared one
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(String),

    /// A read request went past the end of the active byte source
    #[error("read of {length} bytes at offset {offset} exceeds source size {size}")]
    OutOfRange {
        /// Requested start offset
        offset: usize,
        /// Requested length
        length: usize,
        /// Size of the source the read was issued against
        size: usize,
    },

    /// Fixed-layout structure decode failed
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

/// Result type for composition-file operations
pub type CKResult<T> = Result<T, CKError>;

impl CKError {
    /// Shorthand for [`CKError::InvalidFile`]
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidFile(message.into())
    }

    /// Shorthand for [`CKError::CorruptStream`]
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::CorruptStream(message.into())
    }
}
