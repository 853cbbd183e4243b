//! Load options
//!
//! Tunables for [`CKFile::load_with`](crate::CKFile::load_with). The defaults
//! accept every format revision this reader understands and read the whole
//! file, so most callers can use [`CKFile::load`](crate::CKFile::load).

use crate::guid::CKGuid;
use crate::header::MAX_SUPPORTED_VERSION;
use serde::{Deserialize, Serialize};

/// Options controlling how a composition file is loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Newest file format version to accept
    ///
    /// Lowering this rejects newer revisions with
    /// [`CKError::UnsupportedVersion`](crate::CKError::UnsupportedVersion).
    /// Values above [`MAX_SUPPORTED_VERSION`] are invalid.
    pub max_file_version: u32,
    /// Inflated regions at or above this size are placed in an anonymous
    /// memory map instead of a heap buffer
    pub anonymous_map_threshold: usize,
    /// Largest unpacked size a compressed region may declare
    pub max_unpacked_size: usize,
    /// Whether to read the data region (manager data, object payloads and
    /// included files) after the object directory
    pub read_body: bool,
    /// Plugin GUIDs available to the caller; used to mark which plugin
    /// dependencies of the file are resolvable
    pub known_plugins: Vec<CKGuid>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_file_version: MAX_SUPPORTED_VERSION,
            anonymous_map_threshold: 16 * 1024 * 1024, // 16 MB
            max_unpacked_size: 1024 * 1024 * 1024,     // 1 GB
            read_body: true,
            known_plugins: Vec::new(),
        }
    }
}

impl LoadOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the newest accepted file format version
    pub fn with_max_file_version(mut self, version: u32) -> Self {
        self.max_file_version = version;
        self
    }

    /// Set the anonymous-map threshold for inflated regions
    pub fn with_anonymous_map_threshold(mut self, bytes: usize) -> Self {
        self.anonymous_map_threshold = bytes;
        self
    }

    /// Set the decompression size limit
    pub fn with_max_unpacked_size(mut self, bytes: usize) -> Self {
        self.max_unpacked_size = bytes;
        self
    }

    /// Stop after the object directory
    pub fn header_only(mut self) -> Self {
        self.read_body = false;
        self
    }

    /// Add a plugin GUID the caller can resolve
    pub fn with_known_plugin(mut self, guid: CKGuid) -> Self {
        self.known_plugins.push(guid);
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), String> {
        if self.max_file_version > MAX_SUPPORTED_VERSION {
            return Err(format!(
                "max_file_version {} is above the newest supported version {}",
                self.max_file_version, MAX_SUPPORTED_VERSION
            ));
        }

        if self.max_unpacked_size == 0 {
            return Err("max_unpacked_size must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Whether `guid` is listed in [`known_plugins`](Self::known_plugins)
    pub fn knows_plugin(&self, guid: CKGuid) -> bool {
        self.known_plugins.contains(&guid)
    }
}
