//! Configuration for the resource service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for the resource service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory relative virtual paths are resolved against
    pub root: PathBuf,

    /// Check each archive entry against its `adlr` checksum while streaming
    pub verify_checksums: bool,

    /// Buffer size for file-backed readers (in bytes)
    pub read_buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            verify_checksums: false,
            read_buffer_size: 64 * 1024, // 64 KB
        }
    }
}

impl StorageConfig {
    /// Create a new configuration resolving paths under `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set the resolution root
    #[must_use]
    pub fn with_root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.root = root.as_ref().to_path_buf();
        self
    }

    /// Enable or disable checksum verification of archive entries
    #[must_use]
    pub const fn with_verify_checksums(mut self, enable: bool) -> Self {
        self.verify_checksums = enable;
        self
    }

    /// Set the read buffer size
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> crate::Result<()> {
        if self.read_buffer_size == 0 {
            return Err(crate::StorageError::Config(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
