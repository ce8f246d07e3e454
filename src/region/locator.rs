//! Chunk location and availability.
//!
//! Pyramids are sparse: most chunk keys of a level were never written. A
//! level's directory listing is fetched once per `(well, level)` and kept as
//! the set of chunks known to exist. Only those are fetched; keys missing from
//! the set are never requested.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::coords::PixelRect;
use super::decoder::{chunk_key_for, plane_index};
use crate::format::{parse_listing, ArrayMetadata, ChunkKey};
use crate::io::{FetchOutcome, RequestManager, RequestScope, StorePaths, StoreReader};
use crate::well::{LevelMetadata, WellId};

/// Chunk grid cells `(row, col)` overlapping a pixel window.
///
/// The window is clipped to the image first; an empty window yields no
/// cells. Cells are returned in row-major order.
pub fn grid_cells(window: &PixelRect, meta: &ArrayMetadata) -> Vec<(u32, u32)> {
    let image = PixelRect::new(0, 0, meta.width() as i64, meta.height() as i64);
    let window = window.intersection(&image);
    if window.is_empty() {
        return Vec::new();
    }

    let chunk_w = meta.chunk_width() as i64;
    let chunk_h = meta.chunk_height() as i64;

    let col_start = window.x0.div_euclid(chunk_w);
    let col_end = (window.x1 - 1).div_euclid(chunk_w);
    let row_start = window.y0.div_euclid(chunk_h);
    let row_end = (window.y1 - 1).div_euclid(chunk_h);

    (row_start..=row_end)
        .flat_map(|row| (col_start..=col_end).map(move |col| (row as u32, col as u32)))
        .collect()
}

/// A chunk to fetch and where its plane lands in level pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocatedChunk {
    pub key: ChunkKey,

    /// Plane index inside the chunk payload
    pub plane: u64,

    /// Level pixel coordinates of the chunk's top-left corner
    pub origin: (i64, i64),
}

/// Result of locating the chunks of a window.
#[derive(Debug, Clone, Default)]
pub struct LocatedChunks {
    /// Chunk keys overlapping the window, before the availability filter
    pub candidates: usize,

    /// Chunks that exist upstream
    pub available: Vec<LocatedChunk>,

    /// The level listing could not be obtained
    pub listing_missing: bool,
}

/// Availability cache and window-to-chunk mapping.
pub struct ChunkLocator<S> {
    requests: Arc<RequestManager<S>>,
    paths: StorePaths,
    availability: RwLock<HashMap<(WellId, u32), Arc<HashSet<ChunkKey>>>>,
    listings_fetched: AtomicUsize,
}

impl<S: StoreReader> ChunkLocator<S> {
    pub fn new(requests: Arc<RequestManager<S>>, paths: StorePaths) -> Self {
        Self {
            requests,
            paths,
            availability: RwLock::new(HashMap::new()),
            listings_fetched: AtomicUsize::new(0),
        }
    }

    /// Chunks known to exist for one level, or `None` if the listing is
    /// unobtainable. Unobtainable listings are not cached.
    pub async fn availability(
        &self,
        well: &WellId,
        level: u32,
        scope: &RequestScope,
    ) -> Option<Arc<HashSet<ChunkKey>>> {
        if let Some(keys) = self.availability.read().await.get(&(*well, level)) {
            return Some(keys.clone());
        }

        let url = self.paths.listing_url(well, level);
        let request_id = scope.request_id(&format!("{}/listing/{}", well, level));
        self.listings_fetched.fetch_add(1, Ordering::Relaxed);

        let body = match self.requests.fetch(scope, &request_id, &url).await {
            FetchOutcome::Resolved(body) => body,
            FetchOutcome::FailedSoft(e) => {
                warn!(well = %well, level, url = %url, error = %e, "Directory listing unavailable");
                return None;
            }
            FetchOutcome::Aborted => {
                debug!(well = %well, level, "Directory listing cancelled");
                return None;
            }
        };

        let keys: HashSet<ChunkKey> = match parse_listing(&body) {
            Ok(keys) => keys.into_iter().collect(),
            Err(e) => {
                warn!(well = %well, level, url = %url, error = %e, "Malformed directory listing");
                return None;
            }
        };

        debug!(well = %well, level, chunks = keys.len(), "Cached directory listing");
        let keys = Arc::new(keys);
        self.availability
            .write()
            .await
            .insert((*well, level), keys.clone());
        Some(keys)
    }

    /// Chunks to fetch for a pixel window and a set of channel indices.
    pub async fn locate(
        &self,
        meta: &LevelMetadata,
        window: &PixelRect,
        timepoint: u32,
        z: u32,
        channels: &[u32],
        scope: &RequestScope,
    ) -> LocatedChunks {
        let cells = grid_cells(window, &meta.array);
        let mut candidates: Vec<LocatedChunk> = Vec::with_capacity(cells.len() * channels.len());
        let mut seen = HashSet::new();

        for &channel in channels {
            let plane = plane_index(&meta.array, timepoint, channel, z);
            for &(row, col) in &cells {
                let key = chunk_key_for(&meta.array, timepoint, channel, z, row, col);
                if seen.insert((key, plane)) {
                    candidates.push(LocatedChunk {
                        key,
                        plane,
                        origin: (
                            col as i64 * meta.array.chunk_width() as i64,
                            row as i64 * meta.array.chunk_height() as i64,
                        ),
                    });
                }
            }
        }

        if candidates.is_empty() {
            return LocatedChunks::default();
        }

        let Some(known) = self.availability(&meta.well, meta.level, scope).await else {
            return LocatedChunks {
                candidates: candidates.len(),
                available: Vec::new(),
                listing_missing: true,
            };
        };

        let count = candidates.len();
        LocatedChunks {
            candidates: count,
            available: candidates
                .into_iter()
                .filter(|c| known.contains(&c.key))
                .collect(),
            listing_missing: false,
        }
    }

    /// Number of directory listings requested so far.
    pub fn listings_fetched(&self) -> usize {
        self.listings_fetched.load(Ordering::Relaxed)
    }

    /// Number of cached level listings.
    pub async fn cached_levels(&self) -> usize {
        self.availability.read().await.len()
    }

    pub async fn clear(&self) {
        self.availability.write().await.clear();
    }
}
