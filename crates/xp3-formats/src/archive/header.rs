//! Container header and index header records

use binrw::io::{Read, Seek, Write};
use binrw::{BinRead, BinResult, BinWrite};

use super::EncodeMethod;
use super::error::{ArchiveError, ArchiveResult};

/// First container signature
pub const XP3_MAGIC: [u8; 8] = [0x58, 0x50, 0x33, 0x0D, 0x0A, 0x20, 0x0A, 0x1A];

/// Second container signature, immediately after [`XP3_MAGIC`]
pub const XP3_MAGIC_2: [u8; 3] = [0x8B, 0x67, 0x01];

/// Size of the fixed container header in bytes
pub const HEADER_SIZE: u64 = 19;

/// Fixed 19-byte container header
///
/// - Signature #1 (8 bytes)
/// - Signature #2 (3 bytes)
/// - Absolute offset of the index header (u64, little-endian)
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct Xp3Header {
    /// Signature #1, always [`XP3_MAGIC`]
    pub magic: [u8; 8],
    /// Signature #2, always [`XP3_MAGIC_2`]
    pub magic_2: [u8; 3],
    /// Offset of the index header from the start of the file
    pub index_offset: u64,
}

impl Xp3Header {
    /// Create a header pointing at `index_offset`
    pub fn new(index_offset: u64) -> Self {
        Self {
            magic: XP3_MAGIC,
            magic_2: XP3_MAGIC_2,
            index_offset,
        }
    }

    /// Validate both signatures
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.magic != XP3_MAGIC {
            return Err(ArchiveError::InvalidMagic(self.magic.to_vec()));
        }
        if self.magic_2 != XP3_MAGIC_2 {
            return Err(ArchiveError::InvalidMagic(self.magic_2.to_vec()));
        }
        Ok(())
    }
}

/// Header of the index block found at `index_offset`
///
/// One flag byte (low 3 bits: encode method), then the stored size. A zlib
/// index carries a second u64 with the decompressed size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    /// How the index payload is stored
    pub encoding: EncodeMethod,
    /// Bytes of index payload stored in the file
    pub stored_size: u64,
    /// Bytes of index content after decompression
    pub index_size: u64,
}

impl IndexHeader {
    /// Index header for a RAW index of `size` bytes
    pub fn raw(size: u64) -> Self {
        Self {
            encoding: EncodeMethod::Raw,
            stored_size: size,
            index_size: size,
        }
    }

    /// Index header for a zlib index
    pub fn zlib(compressed_size: u64, index_size: u64) -> Self {
        Self {
            encoding: EncodeMethod::Zlib,
            stored_size: compressed_size,
            index_size,
        }
    }

    /// Encoded size of this header in bytes
    pub fn encoded_size(&self) -> u64 {
        match self.encoding {
            EncodeMethod::Raw => 9,
            EncodeMethod::Zlib => 17,
        }
    }
}

impl BinRead for IndexHeader {
    type Args<'a> = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<Self> {
        let pos = reader.stream_position()?;
        let flags = u8::read_options(reader, endian, ())?;
        let encoding = EncodeMethod::from_flags(u32::from(flags)).map_err(|e| {
            binrw::Error::Custom {
                pos,
                err: Box::new(e),
            }
        })?;

        let stored_size = u64::read_options(reader, binrw::Endian::Little, ())?;
        let index_size = match encoding {
            EncodeMethod::Raw => stored_size,
            EncodeMethod::Zlib => u64::read_options(reader, binrw::Endian::Little, ())?,
        };

        Ok(Self {
            encoding,
            stored_size,
            index_size,
        })
    }
}

impl BinWrite for IndexHeader {
    type Args<'a> = ();

    fn write_options<W: Write + Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> BinResult<()> {
        (self.encoding.as_flags() as u8).write_options(writer, binrw::Endian::Little, ())?;
        self.stored_size
            .write_options(writer, binrw::Endian::Little, ())?;
        if self.encoding == EncodeMethod::Zlib {
            self.index_size
                .write_options(writer, binrw::Endian::Little, ())?;
        }
        Ok(())
    }
}

/// Header preceding every chunk of the index content
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct ChunkHeader {
    /// Four ASCII characters naming the chunk
    pub tag: [u8; 4],
    /// Payload length in bytes
    pub size: u64,
}

impl ChunkHeader {
    /// Encoded size of a chunk header
    pub const SIZE: u64 = 12;
}
