//! Test utilities for integration tests.
//!
//! Provides an in-memory object store with request tracking and a builder
//! that writes synthetic OME-Zarr wells into it.
//!
//! Every synthetic well level is an 8 × 8 image in 4 × 4 chunks (a 2 × 2
//! chunk grid) with two channels, one timepoint and one z-plane. At level 0
//! a pixel is 250 µm, so the whole image spans 2 × 2 mm around the well
//! center.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use parking_lot::Mutex;

use omezarr_loader::error::IoError;
use omezarr_loader::format::ChunkKey;
use omezarr_loader::io::{StorePaths, StoreReader};
use omezarr_loader::region::{ChunkProgress, RegionObserver};
use omezarr_loader::{
    EncodedRaster, LoaderConfig, OutputFormat, PlateFormat, RegionError, RegionLoader,
    RegionRequest, RegionResult, StageRect, WellId,
};

pub const BASE_URL: &str = "mem://store";
pub const DATASET: &str = "exp1";
pub const PIXEL_SIZE_UM: f64 = 250.0;
pub const IMAGE_SIZE: u64 = 8;
pub const CHUNK_SIZE: u64 = 4;

pub const BF: &str = "BF LED matrix full";
pub const FLUO_488: &str = "Fluorescence 488 nm Ex";

// =============================================================================
// In-Memory Store with Request Tracking
// =============================================================================

#[derive(Default)]
struct StoreState {
    objects: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    gets: AtomicUsize,
    gets_by_url: Mutex<HashMap<String, usize>>,
}

/// An object store held in memory that counts every GET.
///
/// Clones share state, so a test can keep a handle after moving a clone into
/// a loader.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<Bytes>) {
        self.state.objects.lock().insert(url.into(), body.into());
    }

    /// Make GETs of `url` fail with HTTP 500.
    pub fn fail(&self, url: impl Into<String>) {
        self.state.failing.lock().insert(url.into());
    }

    /// Delay every GET by `delay` (or remove the delay).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.lock() = delay;
    }

    pub fn get_count(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn count_for(&self, url: &str) -> usize {
        self.state.gets_by_url.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StoreReader for MemoryStore {
    async fn get(&self, url: &str) -> Result<Bytes, IoError> {
        self.state.gets.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .gets_by_url
            .lock()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let delay = *self.state.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.failing.lock().contains(url) {
            return Err(IoError::Http {
                status: 500,
                url: url.to_string(),
            });
        }

        self.state
            .objects
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| IoError::NotFound(url.to_string()))
    }

    fn identifier(&self) -> &str {
        BASE_URL
    }
}

// =============================================================================
// Synthetic Wells
// =============================================================================

pub fn well(s: &str) -> WellId {
    s.parse().unwrap()
}

pub fn paths() -> StorePaths {
    StorePaths::new(BASE_URL, DATASET, 96)
}

pub fn chunk_url(well_id: &str, level: u32, channel: u32, row: u32, col: u32) -> String {
    paths().chunk_url(&well(well_id), level, &ChunkKey::new(0, channel, 0, row, col))
}

/// Builder for one level of one synthetic well.
pub struct WellFixture {
    well: WellId,
    level: u32,
    dtype: &'static str,
    zlib: bool,
    timepoints: u64,
    chunks: Vec<(u32, u32, u32, u16)>,
    listed_only: Vec<(u32, u32, u32)>,
    channel_mapping: Vec<(&'static str, u32)>,
}

impl WellFixture {
    pub fn new(well_id: &str, level: u32) -> Self {
        Self {
            well: well(well_id),
            level,
            dtype: "|u1",
            zlib: false,
            timepoints: 1,
            chunks: Vec::new(),
            listed_only: Vec::new(),
            channel_mapping: vec![(BF, 0), (FLUO_488, 1)],
        }
    }

    /// A solid chunk of `value` for `channel` at grid cell `(row, col)`.
    pub fn chunk(mut self, channel: u32, row: u32, col: u32, value: u16) -> Self {
        self.chunks.push((channel, row, col, value));
        self
    }

    /// Every cell of `channel` filled with `value`.
    pub fn full(mut self, channel: u32, value: u16) -> Self {
        for row in 0..2 {
            for col in 0..2 {
                self.chunks.push((channel, row, col, value));
            }
        }
        self
    }

    /// A chunk that appears in the listing but has no object.
    pub fn listed_only(mut self, channel: u32, row: u32, col: u32) -> Self {
        self.listed_only.push((channel, row, col));
        self
    }

    /// Leave `label` out of the well's channel mapping.
    pub fn without_channel(mut self, label: &str) -> Self {
        self.channel_mapping.retain(|(name, _)| *name != label);
        self
    }

    pub fn dtype(mut self, dtype: &'static str) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn zlib(mut self) -> Self {
        self.zlib = true;
        self
    }

    pub fn install(self, store: &MemoryStore) {
        let paths = paths();

        let mapping: Vec<String> = self
            .channel_mapping
            .iter()
            .map(|(name, index)| format!(r#""{}": {}"#, name, index))
            .collect();
        store.insert(
            paths.zattrs_url(&self.well),
            format!(
                r#"{{"squid_canvas": {{"pixel_size_xy_um": {}, "channel_mapping": {{{}}}}}}}"#,
                PIXEL_SIZE_UM,
                mapping.join(", ")
            ),
        );

        let compressor = if self.zlib {
            r#"{"id": "zlib", "level": 1}"#
        } else {
            "null"
        };
        store.insert(
            paths.zarray_url(&self.well, self.level),
            format!(
                r#"{{"zarr_format": 2, "shape": [{}, 2, 1, {}, {}], "chunks": [1, 1, 1, {}, {}],
                    "dtype": "{}", "compressor": {}, "order": "C", "fill_value": 0}}"#,
                self.timepoints, IMAGE_SIZE, IMAGE_SIZE, CHUNK_SIZE, CHUNK_SIZE, self.dtype, compressor
            ),
        );

        let mut listing = vec![r#"{"name": ".zarray", "type": "file"}"#.to_string()];
        for &(channel, row, col, value) in &self.chunks {
            let key = ChunkKey::new(0, channel, 0, row, col);
            listing.push(format!(r#"{{"name": "{}", "type": "file"}}"#, key));
            store.insert(
                paths.chunk_url(&self.well, self.level, &key),
                self.payload(value),
            );
        }
        for &(channel, row, col) in &self.listed_only {
            let key = ChunkKey::new(0, channel, 0, row, col);
            listing.push(format!(r#"{{"name": "{}", "type": "file"}}"#, key));
        }
        store.insert(
            paths.listing_url(&self.well, self.level),
            format!("[{}]", listing.join(",")),
        );
    }

    fn payload(&self, value: u16) -> Vec<u8> {
        let samples = (CHUNK_SIZE * CHUNK_SIZE) as usize;
        let raw: Vec<u8> = match self.dtype {
            "<u2" => (0..samples).flat_map(|_| value.to_le_bytes()).collect(),
            ">u2" => (0..samples).flat_map(|_| value.to_be_bytes()).collect(),
            _ => vec![value as u8; samples],
        };
        if !self.zlib {
            return raw;
        }
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap()
    }
}

// =============================================================================
// Loader Helpers
// =============================================================================

pub fn loader(store: &MemoryStore) -> Arc<RegionLoader<MemoryStore>> {
    loader_with_config(store, LoaderConfig::default())
}

pub fn loader_with_config(
    store: &MemoryStore,
    config: LoaderConfig,
) -> Arc<RegionLoader<MemoryStore>> {
    Arc::new(RegionLoader::new(
        store.clone(),
        BASE_URL,
        DATASET,
        PlateFormat::Wells96,
        config,
    ))
}

/// The whole level-0 image of a well, as raw RGBA.
pub fn whole_well(well_id: &str, channel: &str) -> RegionRequest {
    RegionRequest::new(well(well_id), StageRect::new(0.0, 0.0, 2.0, 2.0), channel, 0)
        .with_format(OutputFormat::Raw)
}

/// Raw RGBA pixels of a result.
pub fn raw_pixels(result: &RegionResult) -> (u32, u32, Vec<u8>) {
    match &result.data {
        Some(EncodedRaster::Raw {
            width,
            height,
            pixels,
        }) => (*width, *height, pixels.to_vec()),
        other => panic!("expected raw pixels, got {:?}", other.as_ref().map(|d| d.format())),
    }
}

pub fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * width + x) * 4) as usize;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

// =============================================================================
// Recording Observer
// =============================================================================

/// Records every callback of a realtime or progressive load.
#[derive(Default)]
pub struct RecordingObserver {
    pub progress: Mutex<Vec<(WellId, usize, usize)>>,
    pub completed: Mutex<Vec<(WellId, bool)>>,
}

impl RegionObserver for RecordingObserver {
    fn on_chunk_progress(&self, progress: &ChunkProgress) {
        self.progress
            .lock()
            .push((progress.well, progress.loaded, progress.total));
    }

    fn on_well_complete(&self, well: &WellId, result: &Result<RegionResult, RegionError>) {
        let success = matches!(result, Ok(r) if r.success());
        self.completed.lock().push((*well, success));
    }
}
