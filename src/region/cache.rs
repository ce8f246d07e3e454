//! Decoded-chunk cache.
//!
//! Overlapping region requests (panning, zooming back and forth) hit the
//! same chunks repeatedly. Decoded 8-bit planes are cached so a revisited
//! chunk costs neither a fetch nor a decode.
//!
//! # Cache Key
//!
//! Chunks are cached by:
//! - Chunk URL (identifies well, level and chunk key)
//! - Element type the payload was decoded as
//! - Plane index inside the chunk (non-zero only when a chunk spans several
//!   timepoints, channels or z-slices)
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of decoded planes in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;

use super::decoder::DecodedChunk;
use crate::format::DataType;

/// Default cache capacity: 256MB
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
pub const DEFAULT_MAX_CHUNK_ENTRIES: usize = 4_096;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for decoded chunk planes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkCacheKey {
    /// Full chunk URL
    pub url: Arc<str>,

    /// Element type the payload was decoded as
    pub dtype: DataType,

    /// Plane index inside the chunk
    pub plane: u64,
}

impl ChunkCacheKey {
    pub fn new(url: impl Into<Arc<str>>, dtype: DataType, plane: u64) -> Self {
        Self {
            url: url.into(),
            dtype,
            plane,
        }
    }
}

// =============================================================================
// Chunk Cache
// =============================================================================

/// LRU cache for decoded chunk planes with size-based capacity.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
pub struct ChunkCache {
    cache: RwLock<LruCache<ChunkCacheKey, Arc<DecodedChunk>>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl ChunkCache {
    /// Create a cache with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHUNK_CACHE_CAPACITY)
    }

    /// Create a cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_CHUNK_ENTRIES)
    }

    /// Create a cache with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get a decoded chunk, marking it as recently used.
    pub async fn get(&self, key: &ChunkCacheKey) -> Option<Arc<DecodedChunk>> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check for a chunk without updating LRU order.
    pub async fn contains(&self, key: &ChunkCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a decoded chunk.
    ///
    /// Least-recently-used entries are evicted until the cache is within
    /// capacity. Re-inserting an existing key replaces it.
    pub async fn put(&self, key: ChunkCacheKey, chunk: Arc<DecodedChunk>) {
        let chunk_size = chunk.byte_len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old) = cache.peek(&key) {
            *current_size = current_size.saturating_sub(old.byte_len());
        }

        // Entry-count eviction inside `push` must be reflected in the size
        if let Some((evicted_key, evicted)) = cache.push(key.clone(), chunk) {
            if evicted_key != key {
                *current_size = current_size.saturating_sub(evicted.byte_len());
            }
        }
        *current_size += chunk_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.byte_len());
                }
                None => break,
            }
        }
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    /// Number of cached planes.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Current total size of cached planes in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::new()
    }
}
