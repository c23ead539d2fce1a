//! Resource locators and shared caches over XP3 archives and plain files.
//!
//! This crate sits between code that wants "the bytes of `bg/sky.png`" and
//! the places those bytes live:
//!
//! - **Locators** ([`ResourceLocator`]): a plain file, or an entry inside an
//!   XP3 container, plus a byte offset. Each locator derives a canonical id
//!   used as the resource cache key.
//! - **Archive cache** ([`ArchiveCache`]): parses each container at most once
//!   and shares the immutable index between all locators.
//! - **Resource cache** ([`ResourceCache`]): decodes each canonical id at most
//!   once (modulo races) and hands out shared handles.
//! - **Service** ([`ResourceService`]): owns both caches and resolves virtual
//!   paths such as `data.xp3/image/bg.png`.
//!
//! Nothing here is global: caches are plain objects owned by whoever
//! composes them.
//!
//! # Example
//!
//! ```rust,no_run
//! use xp3_storage::{Blob, ResourceService, StorageConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = ResourceService::new(StorageConfig::new("/path/to/game"));
//!
//! let locator = service.locate("data.xp3/startup.tjs")?;
//! let script = service.load::<Blob>(&locator)?;
//! println!("{} bytes from {}", script.len(), script.source_id());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;
use xp3_formats::ArchiveError;

// Container handle cache
pub mod archive_cache;

// Configuration
pub mod config;

// Locator variants and byte providers
pub mod locator;

// Resource trait, decoders and handles
pub mod resource;

// Decoded resource cache
pub mod resource_cache;

// Top-level service composing both caches
mod service;

pub use archive_cache::{ArchiveCache, ArchiveCacheStats};
pub use config::StorageConfig;
pub use locator::{FileInfo, ResourceLocator, StreamInfo};
pub use resource::{Blob, Loaded, Resource, ResourceDecoder, ResourceId, TypeDecoder};
pub use resource_cache::{ResourceCache, ResourceCacheStats};
pub use service::ResourceService;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while locating or loading resources.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Container could not be opened, indexed or read.
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Resource does not exist at the location described.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A decoder rejected the bytes it was given.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A cached resource was requested as a different type.
    #[error("Resource {id} is cached as {cached}, requested as {requested}")]
    TypeMismatch {
        /// Canonical locator id
        id: String,
        /// Type the cached resource was built as
        cached: &'static str,
        /// Type the caller asked for
        requested: &'static str,
    },

    /// Building a resource failed.
    #[error("Could not load resource {id}: {source}")]
    ResourceService {
        /// Canonical id of the failing locator
        id: String,
        /// Underlying failure
        #[source]
        source: Box<StorageError>,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Wrap a failure with the id of the locator being loaded
    pub fn resource_service(id: impl Into<String>, source: Self) -> Self {
        Self::ResourceService {
            id: id.into(),
            source: Box::new(source),
        }
    }

    /// Check if this error (or the failure it wraps) is a not-found outcome
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Archive(e) => e.is_not_found(),
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            Self::ResourceService { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error (or the failure it wraps) comes from a malformed container
    pub fn is_format_error(&self) -> bool {
        match self {
            Self::Archive(e) => e.is_format_error(),
            Self::ResourceService { source, .. } => source.is_format_error(),
            _ => false,
        }
    }
}

/// Make `path` absolute without touching the filesystem beyond the working directory
pub(crate) fn absolute_path(path: &std::path::Path) -> std::path::PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
