//! Error types for archive operations

use thiserror::Error;

/// Archive operation result type
pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Errors raised while opening, indexing or reading an XP3 container
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// One of the two header signatures does not match
    #[error("invalid XP3 magic: got {0:02X?}")]
    InvalidMagic(Vec<u8>),

    /// Index contains a chunk tag the parser does not know
    #[error("unknown index chunk: {}", String::from_utf8_lossy(.0))]
    UnknownChunk([u8; 4]),

    /// Index structure is inconsistent
    #[error("invalid archive index: {reason}")]
    InvalidIndex {
        /// Detailed description of the inconsistency
        reason: String,
    },

    /// Index or segment uses an encoding this reader does not implement
    #[error("unsupported encode method: {0}")]
    UnsupportedEncoding(u32),

    /// Entry path is absent from the index
    #[error("entry not found: {0}")]
    EntryNotFound(String),

    /// Query path is not a plain relative path
    #[error("invalid entry path: {0:?}")]
    InvalidPath(String),

    /// Fewer bytes were available than a segment promised
    #[error("truncated archive: segment {segment} expected {expected} bytes, got {actual}")]
    Truncated {
        /// Index of the segment inside its entry
        segment: usize,
        /// Number of decompressed bytes the segment declares
        expected: u64,
        /// Number of decompressed bytes actually produced
        actual: u64,
    },

    /// Decompressed entry content does not match its `adlr` checksum
    #[error("checksum mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Entry path
        path: String,
        /// Checksum stored in the index
        expected: u32,
        /// Checksum of the bytes read
        actual: u32,
    },

    /// Binary read/write error
    #[error("binary format error: {0}")]
    BinRead(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub(crate) fn invalid_index(reason: impl Into<String>) -> Self {
        Self::InvalidIndex {
            reason: reason.into(),
        }
    }

    /// Check if this error means the container itself is malformed
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_)
                | Self::UnknownChunk(_)
                | Self::InvalidIndex { .. }
                | Self::UnsupportedEncoding(_)
                | Self::BinRead(_)
        )
    }

    /// Check if this error is an expected not-found outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EntryNotFound(_))
    }

    /// Check if this error indicates corrupt or truncated entry data
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::ChecksumMismatch { .. })
    }

    /// Recover an archive error carried inside an `io::Error` by the reader
    pub fn from_io(error: std::io::Error) -> Self {
        if error
            .get_ref()
            .is_some_and(|inner| inner.is::<ArchiveError>())
        {
            match error.into_inner().map(|inner| inner.downcast::<ArchiveError>()) {
                Some(Ok(archive_error)) => *archive_error,
                Some(Err(other)) => Self::Io(std::io::Error::other(other)),
                None => Self::Io(std::io::Error::other("unknown I/O error")),
            }
        } else {
            Self::Io(error)
        }
    }

    pub(crate) fn into_io(self) -> std::io::Error {
        let kind = match &self {
            Self::Truncated { .. } => std::io::ErrorKind::UnexpectedEof,
            _ => std::io::ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, self)
    }
}
