//! Region loader: the public entry point.
//!
//! The loader owns every cache and the request manager, so two loaders never
//! share state and [`RegionLoader::clear_caches`] is a complete reset.
//!
//! # Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         RegionLoader                            │
//! │  1. Resolve level metadata   4. Fetch chunks (deduplicated)     │
//! │  2. Stage → pixel window     5. Decode (cached) and draw        │
//! │  3. Locate available chunks  6. Encode and report               │
//! └─────────────────────────────────────────────────────────────────┘
//!         │                │                 │               │
//!         ▼                ▼                 ▼               ▼
//!  MetadataResolver   ChunkLocator    RequestManager    ChunkCache
//! ```
//!
//! Every load runs inside a batch: a [`RequestScope`] with a unique id that
//! tags all of its requests. Cancelling the batch aborts whatever is still in
//! flight; results are then reported as [`RegionStatus::Cancelled`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::cache::{ChunkCache, ChunkCacheKey, DEFAULT_CHUNK_CACHE_CAPACITY, DEFAULT_MAX_CHUNK_ENTRIES};
use super::compositor::{compose, ChunkProgress, CompositeRaster, PlacedChunk, ProgressiveComposer, Provenance};
use super::coords::{CoordinateTransformer, PixelRect, PixelWindow, StageRect};
use super::decoder::decode_chunk;
use super::encoder::{encode, EncodedRaster, OutputFormat};
use super::locator::{ChunkLocator, LocatedChunk, LocatedChunks};
use crate::error::{IoError, MetadataError, RegionError};
use crate::io::{FetchOutcome, RequestManager, RequestScope, StorePaths, StoreReader};
use crate::well::{
    LevelLookup, LevelMetadata, MetadataResolver, PlateFormat, PlateLayout, WellId, WellRegion,
    WellRegionResolver, DEFAULT_DOWNSAMPLE_FACTOR,
};

// =============================================================================
// Configuration
// =============================================================================

/// Loader tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderConfig {
    /// Linear downsampling between pyramid levels
    pub downsample_factor: f64,

    /// Decoded-chunk cache capacity in bytes
    pub chunk_cache_bytes: usize,

    /// Decoded-chunk cache entry limit
    pub chunk_cache_entries: usize,

    /// Cancel the previous realtime batch when a new one starts
    pub supersede_previous: bool,

    /// Encoding used when a request does not choose one
    pub default_format: OutputFormat,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            downsample_factor: DEFAULT_DOWNSAMPLE_FACTOR,
            chunk_cache_bytes: DEFAULT_CHUNK_CACHE_CAPACITY,
            chunk_cache_entries: DEFAULT_MAX_CHUNK_ENTRIES,
            supersede_previous: true,
            default_format: OutputFormat::Png,
        }
    }
}

impl LoaderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.downsample_factor.is_finite() || self.downsample_factor < 1.0 {
            return Err(format!(
                "downsample factor must be at least 1, got {}",
                self.downsample_factor
            ));
        }
        if self.chunk_cache_entries == 0 {
            return Err("chunk cache entry limit cannot be 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Requests and Results
// =============================================================================

/// One region of one well.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRequest {
    pub well: WellId,

    /// Region in millimeters relative to the well center
    pub bounds: StageRect,

    /// Channel labels; several labels form a max-composite
    pub channels: Vec<String>,

    pub level: u32,
    pub timepoint: u32,
    pub z: u32,
    pub format: OutputFormat,
}

impl RegionRequest {
    pub fn new(well: WellId, bounds: StageRect, channel: impl Into<String>, level: u32) -> Self {
        Self {
            well,
            bounds,
            channels: vec![channel.into()],
            level,
            timepoint: 0,
            z: 0,
            format: OutputFormat::default(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_timepoint(mut self, timepoint: u32) -> Self {
        self.timepoint = timepoint;
        self
    }

    pub fn with_z(mut self, z: u32) -> Self {
        self.z = z;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn validate(&self) -> Result<(), RegionError> {
        if self.channels.is_empty() {
            return Err(RegionError::InvalidRequest(
                "at least one channel is required".to_string(),
            ));
        }
        let b = &self.bounds;
        let values = [b.center_x_mm(), b.center_y_mm(), b.width_mm(), b.height_mm()];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(RegionError::InvalidRequest(
                "region bounds must be finite".to_string(),
            ));
        }
        if b.width_mm() <= 0.0 || b.height_mm() <= 0.0 {
            return Err(RegionError::InvalidRequest(format!(
                "region size must be positive, got {} x {} mm",
                b.width_mm(),
                b.height_mm()
            )));
        }
        Ok(())
    }
}

/// Outcome of one region load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegionStatus {
    /// Every available chunk was drawn
    Complete,

    /// Some available chunks failed to load; gaps are left blank
    Partial,

    /// No chunk exists for the region
    Empty,

    /// The well or level could not be resolved
    Unavailable { reason: String },

    /// The batch was cancelled before the region finished
    Cancelled,
}

/// Geometry and counters of a loaded region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionMetadata {
    pub well: WellId,
    pub level: u32,
    pub channels: Vec<String>,
    pub timepoint: u32,

    /// Stage bounds as requested
    pub requested_bounds: StageRect,

    /// Stage bounds where data was actually drawn
    pub actual_bounds: Option<StageRect>,

    /// Pixel window as requested, possibly outside the image
    pub requested_pixels: PixelRect,

    /// Pixel window covered by the raster (clamped to the image)
    pub pixel_window: PixelRect,

    pub width: u32,
    pub height: u32,

    /// Micrometers per pixel at this level
    pub pixel_size_um: f64,

    /// Chunk keys overlapping the window
    pub candidate_chunks: usize,

    /// Chunks that exist upstream
    pub total_chunks: usize,

    /// Chunks drawn
    pub loaded_chunks: usize,

    pub created_at: DateTime<Utc>,
}

/// Result of a region load.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResult {
    pub status: RegionStatus,
    pub data: Option<EncodedRaster>,
    pub metadata: Option<RegionMetadata>,
}

impl RegionResult {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            status: RegionStatus::Unavailable {
                reason: reason.into(),
            },
            data: None,
            metadata: None,
        }
    }

    fn cancelled() -> Self {
        Self {
            status: RegionStatus::Cancelled,
            data: None,
            metadata: None,
        }
    }

    /// Whether any pixel data was produced.
    pub fn success(&self) -> bool {
        matches!(self.status, RegionStatus::Complete | RegionStatus::Partial)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RegionStatus::Cancelled
    }

    pub fn loaded_chunks(&self) -> usize {
        self.metadata.as_ref().map_or(0, |m| m.loaded_chunks)
    }

    pub fn total_chunks(&self) -> usize {
        self.metadata.as_ref().map_or(0, |m| m.total_chunks)
    }
}

/// Plate-coordinate region spanning any number of wells.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRegionRequest {
    /// Region in plate millimeters
    pub bounds: StageRect,
    pub channels: Vec<String>,
    pub level: u32,
    pub timepoint: u32,
    pub z: u32,
    pub format: OutputFormat,
}

impl PlateRegionRequest {
    pub fn new(bounds: StageRect, channel: impl Into<String>, level: u32) -> Self {
        Self {
            bounds,
            channels: vec![channel.into()],
            level,
            timepoint: 0,
            z: 0,
            format: OutputFormat::default(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_timepoint(mut self, timepoint: u32) -> Self {
        self.timepoint = timepoint;
        self
    }
}

/// Overall outcome of a plate region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateStatus {
    /// At least one well produced data
    Loaded,

    /// No well in the region has data
    NoData,

    Cancelled,
}

/// One well's share of a plate region.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateWellResult {
    pub region: WellRegion,
    pub result: RegionResult,
}

/// A well whose metadata or transport failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WellFailure {
    pub well: WellId,
    pub message: String,
}

/// Result of a plate region.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRegionResult {
    pub status: PlateStatus,

    /// Wells that were loaded, in row-major order
    pub wells: Vec<PlateWellResult>,

    /// Wells without data for the request: no archive at the level, or no
    /// such channel or timepoint
    pub skipped: Vec<WellId>,

    pub failures: Vec<WellFailure>,

    /// Wells intersecting the region
    pub requested_wells: usize,
}

impl PlateRegionResult {
    /// Wells that produced pixel data.
    pub fn successful_wells(&self) -> usize {
        self.wells.iter().filter(|w| w.result.success()).count()
    }
}

// =============================================================================
// Realtime Batches
// =============================================================================

/// Receives progress of a realtime batch. Calls are tagged by well.
pub trait RegionObserver: Send + Sync {
    /// A chunk was drawn; `progress.raster` is an independent snapshot.
    fn on_chunk_progress(&self, _progress: &ChunkProgress) {}

    /// A well finished (or was cancelled, or hit a contract error).
    fn on_well_complete(&self, _well: &WellId, _result: &Result<RegionResult, RegionError>) {}
}

/// Final outcome of one well in a realtime batch.
#[derive(Debug, Clone)]
pub struct WellOutcome {
    pub well: WellId,
    pub result: Result<RegionResult, RegionError>,
}

/// Everything a realtime batch produced.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub batch_id: String,
    pub results: Vec<WellOutcome>,
    pub cancelled: bool,
}

impl BatchSummary {
    /// Wells that produced pixel data.
    pub fn successful_wells(&self) -> usize {
        self.results
            .iter()
            .filter(|o| matches!(&o.result, Ok(r) if r.success()))
            .count()
    }
}

/// Handle to a running realtime batch.
pub struct RealtimeBatch {
    batch_id: String,
    scope: RequestScope,
    handle: JoinHandle<BatchSummary>,
}

impl RealtimeBatch {
    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Abort everything still in flight. Wells report `Cancelled`.
    pub fn cancel(&self) {
        self.scope.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.scope.is_cancelled()
    }

    /// Wait for every well to finish.
    pub async fn wait(self) -> Result<BatchSummary, JoinError> {
        self.handle.await
    }
}

/// Cache sizes, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub metadata_levels: usize,
    pub listings: usize,
    pub chunk_entries: usize,
    pub chunk_bytes: usize,
    pub chunk_capacity: usize,
    pub active_batches: usize,
}

// =============================================================================
// Region Loader
// =============================================================================

enum ChunkFetch {
    Placed(PlacedChunk),
    Absent,
    Aborted,
}

struct RegionPlan {
    meta: Arc<LevelMetadata>,
    transformer: CoordinateTransformer,
    window: PixelWindow,
    located: LocatedChunks,
    provenance: Provenance,
}

enum Preparation {
    Ready(RegionPlan),
    Finished(RegionResult),
}

enum PlateWellOutcome {
    Loaded(PlateWellResult),
    Skipped(WellId),
    Failed(WellFailure),
    Cancelled,
}

/// Loads stage-space regions of OME-Zarr wells into composite rasters.
pub struct RegionLoader<S> {
    requests: Arc<RequestManager<S>>,
    metadata: MetadataResolver<S>,
    locator: ChunkLocator<S>,
    chunk_cache: ChunkCache,
    wells: WellRegionResolver,
    config: LoaderConfig,

    /// Live batch scopes keyed by batch id
    batches: Mutex<HashMap<String, RequestScope>>,

    /// Most recent realtime batch
    active_realtime: Mutex<Option<String>>,
}

impl<S: StoreReader> RegionLoader<S> {
    pub fn new(
        source: S,
        base_url: &str,
        dataset: &str,
        plate: PlateFormat,
        config: LoaderConfig,
    ) -> Self {
        let requests = Arc::new(RequestManager::new(source));
        let paths = StorePaths::new(base_url, dataset, plate.well_count());

        Self {
            metadata: MetadataResolver::new(requests.clone(), paths.clone(), config.downsample_factor),
            locator: ChunkLocator::new(requests.clone(), paths),
            chunk_cache: ChunkCache::with_capacity_and_entries(
                config.chunk_cache_bytes,
                config.chunk_cache_entries,
            ),
            wells: WellRegionResolver::new(PlateLayout::new(plate)),
            requests,
            config,
            batches: Mutex::new(HashMap::new()),
            active_realtime: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn requests(&self) -> &Arc<RequestManager<S>> {
        &self.requests
    }

    pub fn layout(&self) -> &PlateLayout {
        self.wells.layout()
    }

    /// Number of directory listings requested so far.
    pub fn listings_fetched(&self) -> usize {
        self.locator.listings_fetched()
    }

    // -------------------------------------------------------------------------
    // One-shot
    // -------------------------------------------------------------------------

    /// Load one region and return the finished raster.
    ///
    /// Absent data and cancellation are reported through
    /// [`RegionResult::status`]; only contract errors are returned as `Err`.
    pub async fn load_region(&self, request: &RegionRequest) -> Result<RegionResult, RegionError> {
        let scope = self.open_batch();
        let _batch = BatchGuard {
            batches: &self.batches,
            batch_id: scope.batch_id().to_string(),
        };
        self.load_scoped(request, &scope).await
    }

    async fn load_scoped(
        &self,
        request: &RegionRequest,
        scope: &RequestScope,
    ) -> Result<RegionResult, RegionError> {
        let plan = match self.prepare(request, scope).await? {
            Preparation::Ready(plan) => plan,
            Preparation::Finished(result) => return Ok(result),
        };

        let outcomes = join_all(
            plan.located
                .available
                .iter()
                .map(|chunk| self.fetch_chunk(&plan.meta, chunk, scope)),
        )
        .await;

        if scope.is_cancelled() {
            debug!(well = %request.well, batch_id = scope.batch_id(), "Region cancelled");
            return Ok(RegionResult::cancelled());
        }

        let placed: Vec<PlacedChunk> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                ChunkFetch::Placed(placed) => Some(placed),
                ChunkFetch::Absent | ChunkFetch::Aborted => None,
            })
            .collect();

        let raster = compose(plan.window.clamped, plan.provenance.clone(), &placed);
        self.finish(request, plan, raster, placed.len())
    }

    // -------------------------------------------------------------------------
    // Progressive
    // -------------------------------------------------------------------------

    /// Load one region chunk by chunk, reporting a snapshot after each draw.
    pub async fn load_region_progressive(
        &self,
        request: &RegionRequest,
        observer: &dyn RegionObserver,
    ) -> Result<RegionResult, RegionError> {
        let scope = self.open_batch();
        let _batch = BatchGuard {
            batches: &self.batches,
            batch_id: scope.batch_id().to_string(),
        };
        self.load_progressive_scoped(request, &scope, observer).await
    }

    async fn load_progressive_scoped(
        &self,
        request: &RegionRequest,
        scope: &RequestScope,
        observer: &dyn RegionObserver,
    ) -> Result<RegionResult, RegionError> {
        let plan = match self.prepare(request, scope).await? {
            Preparation::Ready(plan) => plan,
            Preparation::Finished(result) => return Ok(result),
        };

        let mut composer = ProgressiveComposer::new(
            plan.window.clamped,
            plan.provenance.clone(),
            plan.located.available.len(),
        );

        let mut pending: FuturesUnordered<_> = plan
            .located
            .available
            .iter()
            .map(|chunk| self.fetch_chunk(&plan.meta, chunk, scope))
            .collect();

        while let Some(outcome) = pending.next().await {
            if scope.is_cancelled() {
                break;
            }
            if let ChunkFetch::Placed(placed) = outcome {
                let progress = composer.add(&placed);
                debug!(
                    well = %request.well,
                    loaded = progress.loaded,
                    total = progress.total,
                    "Chunk drawn"
                );
                observer.on_chunk_progress(&progress);
            }
        }
        drop(pending);

        if scope.is_cancelled() {
            debug!(well = %request.well, batch_id = scope.batch_id(), "Progressive region cancelled");
            return Ok(RegionResult::cancelled());
        }

        let (raster, loaded) = composer.finish();
        self.finish(request, plan, raster, loaded)
    }

    // -------------------------------------------------------------------------
    // Plate regions
    // -------------------------------------------------------------------------

    /// Split a plate region into per-well requests.
    pub fn plan_plate_region(&self, query: &PlateRegionRequest) -> Vec<(WellRegion, RegionRequest)> {
        self.wells
            .resolve(&query.bounds)
            .into_iter()
            .map(|region| {
                let request = RegionRequest {
                    well: region.well,
                    bounds: region.well_bounds,
                    channels: query.channels.clone(),
                    level: query.level,
                    timepoint: query.timepoint,
                    z: query.z,
                    format: query.format,
                };
                (region, request)
            })
            .collect()
    }

    /// Load every well a plate region touches.
    ///
    /// Wells without an archive at the level, or without the requested
    /// channel or timepoint, are skipped; wells whose metadata or transport
    /// fails are listed in `failures`. Neither aborts
    /// the other wells.
    pub async fn load_plate_region(
        &self,
        query: &PlateRegionRequest,
    ) -> Result<PlateRegionResult, RegionError> {
        let scope = self.open_batch();
        let _batch = BatchGuard {
            batches: &self.batches,
            batch_id: scope.batch_id().to_string(),
        };

        let planned = self.plan_plate_region(query);
        let requested_wells = planned.len();

        let outcomes = join_all(
            planned
                .into_iter()
                .map(|(region, request)| self.load_plate_well(region, request, &scope)),
        )
        .await;

        let mut result = PlateRegionResult {
            status: PlateStatus::NoData,
            wells: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            requested_wells,
        };

        let mut cancelled = false;
        for outcome in outcomes {
            match outcome? {
                PlateWellOutcome::Loaded(well) => result.wells.push(well),
                PlateWellOutcome::Skipped(well) => result.skipped.push(well),
                PlateWellOutcome::Failed(failure) => result.failures.push(failure),
                PlateWellOutcome::Cancelled => cancelled = true,
            }
        }

        result.status = if cancelled || scope.is_cancelled() {
            PlateStatus::Cancelled
        } else if result.successful_wells() > 0 {
            PlateStatus::Loaded
        } else {
            PlateStatus::NoData
        };

        info!(
            batch_id = scope.batch_id(),
            requested = requested_wells,
            successful = result.successful_wells(),
            skipped = result.skipped.len(),
            failed = result.failures.len(),
            "Plate region loaded"
        );
        Ok(result)
    }

    async fn load_plate_well(
        &self,
        region: WellRegion,
        request: RegionRequest,
        scope: &RequestScope,
    ) -> Result<PlateWellOutcome, RegionError> {
        match self.metadata.resolve(&region.well, request.level, scope).await {
            Ok(_) => {}
            Err(MetadataError::Io(IoError::NotFound(_))) => {
                debug!(well = %region.well, level = request.level, "Well has no archive at level, skipping");
                return Ok(PlateWellOutcome::Skipped(region.well));
            }
            Err(MetadataError::Io(e)) if e.is_cancelled() => return Ok(PlateWellOutcome::Cancelled),
            Err(MetadataError::UnsupportedDataType(dtype)) => {
                return Err(RegionError::UnsupportedDataType(dtype))
            }
            Err(e) => {
                warn!(well = %region.well, error = %e, "Well metadata failed");
                return Ok(PlateWellOutcome::Failed(WellFailure {
                    well: region.well,
                    message: e.to_string(),
                }));
            }
        }

        let result = self.load_scoped(&request, scope).await?;
        Ok(match &result.status {
            RegionStatus::Cancelled => PlateWellOutcome::Cancelled,
            RegionStatus::Unavailable { reason } => {
                debug!(well = %region.well, reason = %reason, "Well has no data for request, skipping");
                PlateWellOutcome::Skipped(region.well)
            }
            _ => PlateWellOutcome::Loaded(PlateWellResult { region, result }),
        })
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Metadata for one level of one well.
    pub async fn level_metadata(&self, well: &WellId, level: u32) -> LevelLookup {
        let scope = self.open_batch();
        let _batch = BatchGuard {
            batches: &self.batches,
            batch_id: scope.batch_id().to_string(),
        };
        self.metadata.lookup(well, level, &scope).await
    }

    // -------------------------------------------------------------------------
    // Cancellation and caches
    // -------------------------------------------------------------------------

    /// Cancel one batch. Returns `false` if it is not running.
    pub fn cancel_batch(&self, batch_id: &str) -> bool {
        let Some(scope) = self.batches.lock().remove(batch_id) else {
            return false;
        };
        scope.cancel();
        let aborted = self.requests.cancel_prefix(&format!("{}/", batch_id));
        debug!(batch_id, aborted, "Batch cancelled");
        true
    }

    /// Cancel every running batch. Returns the number of batches cancelled.
    pub fn cancel_all(&self) -> usize {
        let scopes: Vec<RequestScope> = self.batches.lock().drain().map(|(_, s)| s).collect();
        for scope in &scopes {
            scope.cancel();
        }
        let aborted = self.requests.cancel_all();
        debug!(batches = scopes.len(), aborted, "All batches cancelled");
        scopes.len()
    }

    /// Drop all memoized metadata, listings and decoded chunks.
    pub async fn clear_caches(&self) {
        self.metadata.clear().await;
        self.locator.clear().await;
        self.chunk_cache.clear().await;
        info!("Caches cleared");
    }

    pub async fn cache_stats(&self) -> CacheStats {
        CacheStats {
            metadata_levels: self.metadata.cached_levels().await,
            listings: self.locator.cached_levels().await,
            chunk_entries: self.chunk_cache.len().await,
            chunk_bytes: self.chunk_cache.size().await,
            chunk_capacity: self.chunk_cache.capacity(),
            active_batches: self.active_batches(),
        }
    }

    /// Number of batches currently running.
    pub fn active_batches(&self) -> usize {
        self.batches.lock().len()
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn open_batch(&self) -> RequestScope {
        let scope = RequestScope::new(Uuid::new_v4().to_string());
        self.batches
            .lock()
            .insert(scope.batch_id().to_string(), scope.clone());
        scope
    }

    async fn prepare(
        &self,
        request: &RegionRequest,
        scope: &RequestScope,
    ) -> Result<Preparation, RegionError> {
        request.validate()?;

        let meta = match self.metadata.resolve(&request.well, request.level, scope).await {
            Ok(meta) => meta,
            Err(MetadataError::UnsupportedDataType(dtype)) => {
                return Err(RegionError::UnsupportedDataType(dtype))
            }
            Err(MetadataError::Io(e)) if e.is_cancelled() => {
                return Ok(Preparation::Finished(RegionResult::cancelled()))
            }
            Err(e) => {
                debug!(well = %request.well, level = request.level, error = %e, "Level unavailable");
                return Ok(Preparation::Finished(RegionResult::unavailable(e.to_string())));
            }
        };

        let mut channels: Vec<u32> = Vec::with_capacity(request.channels.len());
        for label in &request.channels {
            match meta.channel_index(label) {
                Some(index) if !channels.contains(&index) => channels.push(index),
                Some(_) => {}
                None => debug!(well = %request.well, channel = %label, "Channel not present"),
            }
        }
        if channels.is_empty() {
            return Ok(Preparation::Finished(RegionResult::unavailable(format!(
                "no requested channel present in well {}",
                request.well
            ))));
        }

        if request.timepoint as u64 >= meta.array.timepoint_count() {
            return Ok(Preparation::Finished(RegionResult::unavailable(format!(
                "timepoint {} not present in well {}",
                request.timepoint, request.well
            ))));
        }

        let transformer = CoordinateTransformer::for_level(&meta);
        let window = transformer.window(&request.bounds);
        let located = if window.is_empty() {
            LocatedChunks::default()
        } else {
            self.locator
                .locate(&meta, &window.clamped, request.timepoint, request.z, &channels, scope)
                .await
        };

        if scope.is_cancelled() {
            return Ok(Preparation::Finished(RegionResult::cancelled()));
        }

        let provenance = Provenance::new(
            request.well,
            request.level,
            request.channels.clone(),
            request.timepoint,
        );

        Ok(Preparation::Ready(RegionPlan {
            meta,
            transformer,
            window,
            located,
            provenance,
        }))
    }

    async fn fetch_chunk(
        &self,
        meta: &LevelMetadata,
        chunk: &LocatedChunk,
        scope: &RequestScope,
    ) -> ChunkFetch {
        let url = self.metadata.paths().chunk_url(&meta.well, meta.level, &chunk.key);
        let cache_key = ChunkCacheKey::new(url.as_str(), meta.array.dtype, chunk.plane);

        if let Some(decoded) = self.chunk_cache.get(&cache_key).await {
            return ChunkFetch::Placed(PlacedChunk {
                chunk: decoded,
                origin: chunk.origin,
            });
        }

        let request_id = scope.request_id(&format!("{}/{}/{}", meta.well, meta.level, chunk.key));
        match self.requests.fetch(scope, &request_id, &url).await {
            FetchOutcome::Resolved(payload) => match decode_chunk(&payload, &meta.array, chunk.plane) {
                Ok(decoded) => {
                    let decoded = Arc::new(decoded);
                    self.chunk_cache.put(cache_key, decoded.clone()).await;
                    ChunkFetch::Placed(PlacedChunk {
                        chunk: decoded,
                        origin: chunk.origin,
                    })
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Chunk decode failed, treating as absent");
                    ChunkFetch::Absent
                }
            },
            FetchOutcome::FailedSoft(e) => {
                debug!(url = %url, error = %e, "Chunk unavailable");
                ChunkFetch::Absent
            }
            FetchOutcome::Aborted => ChunkFetch::Aborted,
        }
    }

    fn finish(
        &self,
        request: &RegionRequest,
        plan: RegionPlan,
        raster: CompositeRaster,
        loaded: usize,
    ) -> Result<RegionResult, RegionError> {
        let total = plan.located.available.len();
        let status = if loaded == 0 {
            RegionStatus::Empty
        } else if loaded < total {
            RegionStatus::Partial
        } else {
            RegionStatus::Complete
        };

        let data = if loaded > 0 {
            Some(encode(&raster, request.format)?)
        } else {
            None
        };

        let metadata = RegionMetadata {
            well: request.well,
            level: request.level,
            channels: request.channels.clone(),
            timepoint: request.timepoint,
            requested_bounds: request.bounds,
            actual_bounds: raster
                .drawn_bounds()
                .map(|drawn| plan.transformer.pixel_rect_to_stage(&drawn)),
            requested_pixels: plan.window.requested,
            pixel_window: plan.window.clamped,
            width: raster.width(),
            height: raster.height(),
            pixel_size_um: plan.meta.effective_pixel_size_um(),
            candidate_chunks: plan.located.candidates,
            total_chunks: total,
            loaded_chunks: loaded,
            created_at: raster.provenance().created_at,
        };

        info!(
            well = %request.well,
            level = request.level,
            loaded,
            total,
            listing_missing = plan.located.listing_missing,
            "Region loaded"
        );

        Ok(RegionResult {
            status,
            data,
            metadata: Some(metadata),
        })
    }
}

impl<S: StoreReader + 'static> RegionLoader<S> {
    /// Load several regions progressively in the background.
    ///
    /// Each well reports chunk progress and its final result to `observer`.
    /// When [`LoaderConfig::supersede_previous`] is set, the previous
    /// realtime batch is cancelled first.
    pub fn load_regions_realtime(
        self: &Arc<Self>,
        requests: Vec<RegionRequest>,
        observer: Arc<dyn RegionObserver>,
    ) -> RealtimeBatch {
        if self.config.supersede_previous {
            let previous = self.active_realtime.lock().take();
            if let Some(previous) = previous {
                if self.cancel_batch(&previous) {
                    debug!(batch_id = %previous, "Superseded previous realtime batch");
                }
            }
        }

        let scope = self.open_batch();
        let batch_id = scope.batch_id().to_string();
        *self.active_realtime.lock() = Some(batch_id.clone());

        let loader = Arc::clone(self);
        let task_scope = scope.clone();
        let task_batch_id = batch_id.clone();

        let handle = tokio::spawn(async move {
            let _batch = BatchGuard {
                batches: &loader.batches,
                batch_id: task_batch_id.clone(),
            };

            let wells = requests.iter().map(|request| {
                let loader = &loader;
                let scope = &task_scope;
                let observer = &observer;
                async move {
                    let result = loader
                        .load_progressive_scoped(request, scope, &**observer)
                        .await;
                    observer.on_well_complete(&request.well, &result);
                    WellOutcome {
                        well: request.well,
                        result,
                    }
                }
            });
            let results = join_all(wells).await;

            BatchSummary {
                batch_id: task_batch_id,
                results,
                cancelled: task_scope.is_cancelled(),
            }
        });

        RealtimeBatch {
            batch_id,
            scope,
            handle,
        }
    }
}

/// Unregisters a batch when its load completes or is dropped.
struct BatchGuard<'a> {
    batches: &'a Mutex<HashMap<String, RequestScope>>,
    batch_id: String,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.batches.lock().remove(&self.batch_id);
    }
}
