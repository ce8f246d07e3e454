//! Chunk payload decoding.
//!
//! A chunk payload is decompressed, the requested `(t, c, z)` plane is
//! sliced out, and its samples are reduced to 8-bit gray:
//!
//! - `u1`: used as-is
//! - `u2`: `round(v / 65535 * 255)`, honoring the declared byte order
//!
//! The 16-bit reduction is a fixed linear map, not contrast stretching.

use crate::error::DecodeError;
use crate::format::{ArrayMetadata, ByteOrder, ChunkKey, DataType};
use crate::io::{read_u16_be, read_u16_le};

/// One decoded chunk plane: 8-bit gray, row-major, full chunk size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChunk {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedChunk {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// One row of samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Index of the `(t, c, z)` plane inside the chunk that holds it.
///
/// Chunks are C-ordered over `(t, c, z, y, x)`, so with chunk extents
/// `(ct, cc, cz)` the plane index is `((t % ct) * cc + c % cc) * cz + z % cz`.
pub fn plane_index(meta: &ArrayMetadata, t: u32, c: u32, z: u32) -> u64 {
    let [ct, cc, cz, _, _] = meta.chunks;
    ((t as u64 % ct) * cc + c as u64 % cc) * cz + z as u64 % cz
}

/// Chunk key holding element `(t, c, z)` at chunk grid position `(row, col)`.
pub fn chunk_key_for(meta: &ArrayMetadata, t: u32, c: u32, z: u32, row: u32, col: u32) -> ChunkKey {
    let [ct, cc, cz, _, _] = meta.chunks;
    ChunkKey::new(
        (t as u64 / ct) as u32,
        (c as u64 / cc) as u32,
        (z as u64 / cz) as u32,
        row,
        col,
    )
}

/// Rescale a 16-bit sample to 8 bits.
#[inline]
pub fn rescale_u16(value: u16) -> u8 {
    ((value as f64 / u16::MAX as f64) * 255.0).round() as u8
}

/// Decode one plane of a chunk payload.
pub fn decode_chunk(
    payload: &[u8],
    meta: &ArrayMetadata,
    plane: u64,
) -> Result<DecodedChunk, DecodeError> {
    let expected = meta.chunk_byte_len();
    let raw = meta.compressor.decompress(payload, expected)?;
    if raw.len() != expected {
        return Err(DecodeError::SizeMismatch {
            expected,
            actual: raw.len(),
        });
    }

    let width = meta.chunk_width() as u32;
    let height = meta.chunk_height() as u32;
    let sample_count = width as usize * height as usize;
    let plane_bytes = sample_count * meta.dtype.size();
    let start = plane as usize * plane_bytes;

    let samples = raw
        .get(start..start + plane_bytes)
        .ok_or(DecodeError::SizeMismatch {
            expected: start + plane_bytes,
            actual: raw.len(),
        })?;

    let pixels = match meta.dtype {
        DataType::Uint8 => samples.to_vec(),
        DataType::Uint16(ByteOrder::Little) => samples
            .chunks_exact(2)
            .map(|s| rescale_u16(read_u16_le(s)))
            .collect(),
        DataType::Uint16(ByteOrder::Big) => samples
            .chunks_exact(2)
            .map(|s| rescale_u16(read_u16_be(s)))
            .collect(),
    };

    Ok(DecodedChunk::new(width, height, pixels))
}
