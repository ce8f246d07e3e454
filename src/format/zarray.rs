//! Per-level array metadata (`.zarray`).
//!
//! Every pyramid level is a Zarr v2 array of five dimensions ordered
//! `(t, c, z, y, x)`. Only the fields needed to address and decode chunks are
//! kept; fill value and filters are ignored because absent chunks are left
//! blank rather than filled.

use serde::Deserialize;

use super::codec::Compressor;
use crate::error::MetadataError;

/// Number of array dimensions: t, c, z, y, x.
pub const NDIM: usize = 5;

const Y_AXIS: usize = 3;
const X_AXIS: usize = 4;

// =============================================================================
// Data Type
// =============================================================================

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Element type of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit unsigned integer
    Uint8,

    /// 16-bit unsigned integer with the given byte order
    Uint16(ByteOrder),
}

impl DataType {
    /// Parse a NumPy-style dtype string (`|u1`, `<u2`, `>u2`, ...).
    pub fn parse(dtype: &str) -> Result<Self, MetadataError> {
        match dtype {
            "|u1" | "<u1" | ">u1" | "u1" | "uint8" => Ok(DataType::Uint8),
            "<u2" | "uint16" => Ok(DataType::Uint16(ByteOrder::Little)),
            ">u2" => Ok(DataType::Uint16(ByteOrder::Big)),
            other => Err(MetadataError::UnsupportedDataType(other.to_string())),
        }
    }

    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            DataType::Uint8 => 1,
            DataType::Uint16(_) => 2,
        }
    }

    /// Largest representable sample value.
    pub fn max_value(&self) -> u32 {
        match self {
            DataType::Uint8 => u8::MAX as u32,
            DataType::Uint16(_) => u16::MAX as u32,
        }
    }

    /// Canonical dtype string (used in cache keys).
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Uint8 => "|u1",
            DataType::Uint16(ByteOrder::Little) => "<u2",
            DataType::Uint16(ByteOrder::Big) => ">u2",
        }
    }
}

// =============================================================================
// Array Metadata
// =============================================================================

#[derive(Deserialize)]
struct RawZarray {
    #[serde(default)]
    zarr_format: Option<u32>,
    shape: Vec<u64>,
    chunks: Vec<u64>,
    dtype: String,
    #[serde(default)]
    compressor: Option<RawCompressor>,
    #[serde(default)]
    order: Option<String>,
}

#[derive(Deserialize)]
struct RawCompressor {
    id: String,
}

/// Shape, chunking and encoding of one pyramid level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayMetadata {
    /// Array shape `(t, c, z, y, x)`
    pub shape: [u64; NDIM],

    /// Chunk shape `(t, c, z, y, x)`
    pub chunks: [u64; NDIM],

    /// Element type
    pub dtype: DataType,

    /// Chunk compressor
    pub compressor: Compressor,
}

impl ArrayMetadata {
    /// Parse a `.zarray` document fetched from `url`.
    pub fn parse(body: &[u8], url: &str) -> Result<Self, MetadataError> {
        let raw: RawZarray =
            serde_json::from_slice(body).map_err(|e| MetadataError::InvalidJson {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if let Some(version) = raw.zarr_format {
            if version != 2 {
                return Err(MetadataError::InvalidJson {
                    url: url.to_string(),
                    message: format!("unsupported zarr_format {}", version),
                });
            }
        }

        if raw.shape.len() != NDIM || raw.chunks.len() != NDIM {
            return Err(MetadataError::InvalidShape {
                shape: raw.shape.len(),
                chunks: raw.chunks.len(),
            });
        }

        if raw.chunks.iter().any(|&c| c == 0) {
            return Err(MetadataError::InvalidJson {
                url: url.to_string(),
                message: "chunk dimensions must be non-zero".to_string(),
            });
        }

        if let Some(order) = raw.order.as_deref() {
            if order != "C" {
                return Err(MetadataError::InvalidJson {
                    url: url.to_string(),
                    message: format!("unsupported memory order '{}'", order),
                });
            }
        }

        let dtype = DataType::parse(&raw.dtype)?;
        let compressor = Compressor::from_id(raw.compressor.as_ref().map(|c| c.id.as_str()))?;

        let mut shape = [0u64; NDIM];
        let mut chunks = [0u64; NDIM];
        shape.copy_from_slice(&raw.shape);
        chunks.copy_from_slice(&raw.chunks);

        Ok(Self {
            shape,
            chunks,
            dtype,
            compressor,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> u64 {
        self.shape[X_AXIS]
    }

    /// Image height in pixels.
    pub fn height(&self) -> u64 {
        self.shape[Y_AXIS]
    }

    /// Chunk width in pixels.
    pub fn chunk_width(&self) -> u64 {
        self.chunks[X_AXIS]
    }

    /// Chunk height in pixels.
    pub fn chunk_height(&self) -> u64 {
        self.chunks[Y_AXIS]
    }

    /// Number of chunks along x and y (including partial edge chunks).
    pub fn chunk_grid(&self) -> (u64, u64) {
        (
            self.width().div_ceil(self.chunk_width()),
            self.height().div_ceil(self.chunk_height()),
        )
    }

    /// Stored byte length of one chunk before compression.
    ///
    /// Zarr v2 stores edge chunks at full chunk size.
    pub fn chunk_byte_len(&self) -> usize {
        self.chunks.iter().product::<u64>() as usize * self.dtype.size()
    }

    /// Number of channels in the array.
    pub fn channel_count(&self) -> u64 {
        self.shape[1]
    }

    /// Number of timepoints in the array.
    pub fn timepoint_count(&self) -> u64 {
        self.shape[0]
    }
}
