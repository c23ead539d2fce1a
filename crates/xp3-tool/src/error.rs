//! Error types for the command-line tool.

use std::path::PathBuf;
use thiserror::Error;
use xp3_formats::ArchiveError;

/// Result type for tool commands.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors raised by tool commands.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Container could not be read or written
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// I/O error on a path outside the container
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Report output failed
    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// JSON serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Directory traversal failed while packing
    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// Some entries failed verification
    #[error("{failed} of {total} entries failed verification")]
    VerifyFailed {
        /// Entries that failed
        failed: usize,
        /// Entries checked
        total: usize,
    },
}

impl ToolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
