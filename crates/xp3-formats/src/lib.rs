//! Parser, segmented reader and builder for XP3 archive containers
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::uninlined_format_args)] // Backwards compatibility
#![allow(clippy::doc_markdown)] // Format-specific terms don't need backticks
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! XP3 is the archive container used by the Kirikiri engine family. A
//! container holds many logical files (entries), each stored as one or more
//! independently RAW or zlib encoded segments, plus a (usually compressed)
//! chunked index at the end of the file.
//!
//! # Layout
//!
//! ```text
//! +---------------------------+ 0
//! | magic (11 bytes)          |
//! | index offset (u64 LE)     |
//! +---------------------------+ 19
//! | segment data ...          |
//! +---------------------------+ index offset
//! | index header              |
//! | index chunks (File/info/  |
//! |  segm/adlr), maybe zlib   |
//! +---------------------------+
//! ```
//!
//! # Modules
//!
//! - [`archive`]: container parsing ([`archive::Xp3Archive`]), the
//!   decompressing entry reader ([`archive::SegmentStream`]) and the
//!   container writer ([`archive::Xp3Builder`])
//! - [`adler32`]: the entry checksum used by the `adlr` chunk

#![warn(missing_docs)]

pub mod adler32;
pub mod archive;

pub use adler32::{Adler32, adler32};
pub use archive::{
    ArchiveError, ArchiveResult, EncodeMethod, IndexEntry, Segment, SegmentStream, Xp3Archive,
    Xp3Builder,
};
