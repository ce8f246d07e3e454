//! OME-Zarr storage format.
//!
//! Parsers for the documents and keys found inside a well archive:
//!
//! - [`zarray`] - per-level array metadata (`.zarray`)
//! - [`zattrs`] - whole-array attributes (`.zattrs`): pixel size and channels
//! - [`codec`] - chunk compressors
//! - [`chunk_key`] - chunk addressing and directory listing entries
//! - [`channels`] - static channel-name table

pub mod channels;
pub mod chunk_key;
pub mod codec;
pub mod zarray;
pub mod zattrs;

pub use channels::{static_channel_index, KNOWN_CHANNELS};
pub use chunk_key::{parse_listing, ChunkKey, DirectoryEntry, EntryKind};
pub use codec::Compressor;
pub use zarray::{ArrayMetadata, ByteOrder, DataType};
pub use zattrs::{ChannelMap, PixelSizeSource, WellAttributes};
