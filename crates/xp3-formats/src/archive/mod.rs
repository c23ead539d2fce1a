//! XP3 archive containers
//!
//! This module parses container files into an immutable in-memory index,
//! streams entry content across RAW and zlib segments, and writes new
//! containers.
//!
//! # Architecture
//!
//! Reading an entry is a two-step lookup:
//! 1. **Index**: entry path → [`IndexEntry`] (sizes, checksum, segment table)
//! 2. **Segments**: each [`Segment`] is a byte range of the container, stored
//!    RAW or as an independent zlib stream
//!
//! ```text
//! Entry Resolution Flow:
//! path → Xp3Archive index → IndexEntry → Segments → SegmentStream → bytes
//! ```
//!
//! # Usage Examples
//!
//! ## Read an entry
//!
//! ```rust,no_run
//! use std::io::Read;
//! use xp3_formats::archive::Xp3Archive;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = Xp3Archive::open("data.xp3")?;
//! for path in archive.list_files() {
//!     println!("{path}");
//! }
//!
//! let (_entry, mut stream) = archive.extract("startup.tjs")?;
//! let mut script = Vec::new();
//! stream.read_to_end(&mut script)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Build a container
//!
//! ```rust
//! use std::io::Cursor;
//! use xp3_formats::archive::{EncodeMethod, Xp3Archive, Xp3Builder};
//!
//! let mut builder = Xp3Builder::new();
//! builder.add_file("a.txt", b"hello", EncodeMethod::Raw);
//! builder.add_split("b.bin", b"0123456789", 5, EncodeMethod::Zlib);
//!
//! let mut buf = Cursor::new(Vec::new());
//! builder.build(&mut buf, EncodeMethod::Zlib)?;
//!
//! let archive = Xp3Archive::parse(&mut buf, "memory.xp3")?;
//! assert_eq!(archive.list_files(), vec!["a.txt", "b.bin"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod container;
mod error;
mod header;
mod index;
mod stream;

pub use builder::Xp3Builder;
pub use container::{
    DEFAULT_READ_BUFFER_SIZE, EntryStream, MAX_INDEX_SIZE, MAX_PREALLOCATION, Xp3Archive,
    preallocation, validate_entry_path,
};
pub use error::{ArchiveError, ArchiveResult};
pub use header::{ChunkHeader, HEADER_SIZE, IndexHeader, XP3_MAGIC, XP3_MAGIC_2, Xp3Header};
pub use index::{
    CHUNK_ADLR, CHUNK_FILE, CHUNK_INFO, CHUNK_SEGM, CHUNK_TIME, EncodeMethod, FLAG_PROTECTED,
    IndexEntry, Segment, normalize_path,
};
pub use stream::SegmentStream;
