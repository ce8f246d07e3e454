//! Region loading and composition.
//!
//! This module turns a stage-space rectangle into a composite raster:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              RegionLoader               │
//! └────────────────────┬────────────────────┘
//!                      │
//!       ┌──────────────┼───────────────┐
//!       ▼              ▼               ▼
//! ┌───────────┐ ┌─────────────┐ ┌─────────────┐
//! │Coordinate │ │ChunkLocator │ │ ChunkCache  │
//! │Transformer│ │(availability│ │ (decoded    │
//! │           │ │  listings)  │ │  planes)    │
//! └───────────┘ └─────────────┘ └─────────────┘
//!                      │
//!                      ▼
//!      decode_chunk → CompositeRaster → encode
//! ```
//!
//! # Components
//!
//! - [`RegionLoader`]: one-shot, progressive, realtime and plate-wide loads
//! - [`CoordinateTransformer`]: stage millimeters ↔ level pixels
//! - [`ChunkLocator`]: window → chunk keys, filtered by the level listing
//! - [`ChunkCache`]: size-bounded LRU of decoded chunk planes
//! - [`CompositeRaster`]: RGBA output buffer with provenance
//! - [`OutputFormat`]: PNG blob, base64 data URL or raw pixels

mod cache;
mod compositor;
mod coords;
mod decoder;
mod encoder;
mod loader;
mod locator;

pub use cache::{ChunkCache, ChunkCacheKey, DEFAULT_CHUNK_CACHE_CAPACITY, DEFAULT_MAX_CHUNK_ENTRIES};
pub use compositor::{
    compose, ChunkProgress, CompositeRaster, PlacedChunk, ProgressiveComposer, Provenance,
};
pub use coords::{CoordinateTransformer, PixelRect, PixelWindow, StageRect};
pub use decoder::{chunk_key_for, decode_chunk, plane_index, rescale_u16, DecodedChunk};
pub use encoder::{encode, EncodedRaster, OutputFormat};
pub use loader::{
    BatchSummary, CacheStats, LoaderConfig, PlateRegionRequest, PlateRegionResult, PlateStatus,
    PlateWellResult, RealtimeBatch, RegionLoader, RegionMetadata, RegionObserver, RegionRequest,
    RegionResult, RegionStatus, WellFailure, WellOutcome,
};
pub use locator::{grid_cells, ChunkLocator, LocatedChunk, LocatedChunks};
