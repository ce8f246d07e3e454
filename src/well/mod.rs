//! Wells and their metadata.
//!
//! Each well of a multi-well plate is an independent storage unit with its
//! own pyramid and its own stage origin (the well center).
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           WellRegionResolver            │
//! │  (plate query → per-well sub-regions)   │
//! └────────────────────┬────────────────────┘
//!                      │ uses
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              PlateLayout                │
//! │   (96/48/24-well geometry, well ids)    │
//! └─────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────┐
//! │           MetadataResolver              │
//! │ (.zattrs + .zarray per well and level,  │
//! │  memoized; soft failure per well)       │
//! └─────────────────────────────────────────┘
//! ```

mod id;
mod layout;
mod metadata;
mod resolver;

pub use id::WellId;
pub use layout::{PlateFormat, PlateLayout};
pub use metadata::{LevelLookup, LevelMetadata, MetadataResolver, DEFAULT_DOWNSAMPLE_FACTOR};
pub use resolver::{WellRegion, WellRegionResolver, MIN_OVERLAP_FRACTION};
