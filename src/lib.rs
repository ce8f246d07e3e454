//! # OME-Zarr Region Loader
//!
//! Loads arbitrary regions of multi-well plate images stored as sparse
//! OME-Zarr pyramids behind an HTTP object store, and composites them into
//! RGBA rasters.
//!
//! ## Features
//!
//! - **Sparse pyramids**: only chunks present in the level's directory listing are requested
//! - **Deduplicated fetches**: concurrent requests for the same object share one GET
//! - **Cancellable batches**: every load runs in a batch that can be aborted as a unit
//! - **Progressive rendering**: snapshots after each chunk, pixel-identical to one-shot loads
//! - **Plate queries**: one region in plate coordinates fans out across wells
//!
//! ## Architecture
//!
//! - [`io`] - Store access, path layout and the deduplicating request manager
//! - [`mod@format`] - `.zarray`/`.zattrs` parsing, chunk keys and codecs
//! - [`well`] - Well ids, plate geometry and per-level metadata
//! - [`region`] - Coordinates, chunk location, decoding, compositing and the loader
//! - [`server`] - Axum-based HTTP API
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use omezarr_loader::{
//!     create_http_client, HttpStore, LoaderConfig, PlateFormat, RegionLoader, RegionRequest,
//!     StageRect,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let base_url = "https://store.example.org/plates";
//!     let client = create_http_client(Duration::from_secs(30)).unwrap();
//!     let store = HttpStore::new(client, base_url);
//!     let loader = RegionLoader::new(store, base_url, "exp1", PlateFormat::Wells96, LoaderConfig::default());
//!
//!     let request = RegionRequest::new(
//!         "B3".parse().unwrap(),
//!         StageRect::new(0.0, 0.0, 1.5, 1.5),
//!         "BF LED matrix full",
//!         2,
//!     );
//!     let result = loader.load_region(&request).await.unwrap();
//!     println!("{:?}", result.status);
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod region;
pub mod server;
pub mod well;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, RenderConfig, ServeConfig, StoreConfig};
pub use error::{DecodeError, IoError, MetadataError, RegionError};
pub use format::{ArrayMetadata, ChunkKey, DataType, WellAttributes};
pub use io::{create_http_client, FetchOutcome, HttpStore, RequestManager, RequestScope, StorePaths, StoreReader};
pub use region::{
    BatchSummary, CacheStats, ChunkProgress, CompositeRaster, CoordinateTransformer,
    EncodedRaster, LoaderConfig, OutputFormat, PixelRect, PixelWindow, PlateRegionRequest,
    PlateRegionResult, PlateStatus, RealtimeBatch, RegionLoader, RegionMetadata, RegionObserver,
    RegionRequest, RegionResult, RegionStatus, StageRect,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use well::{LevelLookup, LevelMetadata, PlateFormat, PlateLayout, WellId, WellRegion};
