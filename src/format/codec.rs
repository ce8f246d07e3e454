//! Chunk compressors.
//!
//! Wells written by the acquisition software store raw chunks
//! (`"compressor": null`). Archives re-packed by other tools may use zlib or
//! gzip; both are decoded with `flate2`.

use std::io::Read;

use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::{DecodeError, MetadataError};

/// Compressor declared in `.zarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compressor {
    None,
    Zlib,
    Gzip,
}

impl Compressor {
    /// Resolve a numcodecs compressor id.
    pub fn from_id(id: Option<&str>) -> Result<Self, MetadataError> {
        match id {
            None => Ok(Compressor::None),
            Some("zlib") => Ok(Compressor::Zlib),
            Some("gzip") => Ok(Compressor::Gzip),
            Some(other) => Err(MetadataError::UnsupportedCompressor(other.to_string())),
        }
    }

    /// Decompress a chunk payload.
    ///
    /// Output is cut off one byte past `expected_len`, so an oversized stream
    /// shows up as a length mismatch without being inflated in full.
    pub fn decompress(&self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, DecodeError> {
        match self {
            Compressor::None => Ok(data.to_vec()),
            Compressor::Zlib => read_all(ZlibDecoder::new(data), expected_len),
            Compressor::Gzip => read_all(GzDecoder::new(data), expected_len),
        }
    }
}

fn read_all<R: Read>(reader: R, expected_len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(expected_len);
    reader
        .take(expected_len as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::Decompress(e.to_string()))?;
    Ok(out)
}
