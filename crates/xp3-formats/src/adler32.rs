//! Adler-32 checksum (RFC 1950)
//!
//! XP3 stores the Adler-32 of each entry's decompressed content in the
//! `adlr` index chunk. The incremental [`Adler32`] hasher lets the segment
//! reader verify content while streaming.

/// Largest prime smaller than 65536
const MOD_ADLER: u32 = 65_521;

/// Largest number of bytes that can be summed before `b` may overflow u32
const NMAX: usize = 5552;

/// Incremental Adler-32 hasher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Create a hasher in its initial state
    pub const fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Feed more data into the checksum
    pub fn update(&mut self, data: &[u8]) {
        for block in data.chunks(NMAX) {
            for &byte in block {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    /// Current checksum value
    pub const fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the Adler-32 checksum of `data` in one call
pub fn adler32(data: &[u8]) -> u32 {
    let mut hasher = Adler32::new();
    hasher.update(data);
    hasher.finish()
}
