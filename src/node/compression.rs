//! Payload compression and checksums.
//!
//! Array payloads may be stored zlib-compressed. The node header records
//! the codec, the uncompressed length and a CRC-32 of the uncompressed
//! bytes, so decoding never has to guess.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};

use crate::util::{Error, Result};

/// Payload codec, stored as one byte in the node header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Codec {
    #[default]
    None = 0,
    Zlib = 1,
}

impl Codec {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Zlib),
            other => Err(Error::other(format!("unknown payload codec {}", other))),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
        }
    }
}

/// Compress with zlib at `level` (1-9).
///
/// Returns `None` when compression is off or would not make the payload
/// smaller; the caller then stores the bytes as they are.
pub fn compress(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    if level == 0 || data.is_empty() {
        return Ok(None);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    if compressed.len() >= data.len() {
        return Ok(None);
    }
    Ok(Some(compressed))
}

/// Upper bound on the deflate expansion ratio (zlib tops out near 1032:1).
const MAX_EXPANSION: usize = 1032;

/// Inflate a zlib stream that must expand to exactly `expected_len` bytes.
///
/// `expected_len` comes from the node header and is not trusted: lengths
/// the stream cannot inflate to are rejected before anything is allocated.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let bound = data.len().saturating_mul(MAX_EXPANSION).saturating_add(64);
    if expected_len > bound {
        return Err(Error::other(format!(
            "zlib payload of {} bytes cannot inflate to {} bytes",
            data.len(),
            expected_len
        )));
    }
    let limit = (expected_len as u64)
        .checked_add(1)
        .ok_or_else(|| Error::other("inflated payload length overflows"))?;
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .take(limit)
        .read_to_end(&mut out)
        .map_err(|e| Error::other(format!("zlib payload: {}", e)))?;
    if out.len() != expected_len {
        return Err(Error::length("inflated payload", expected_len, out.len()));
    }
    Ok(out)
}

/// CRC-32 of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(data);
    crc.sum()
}
