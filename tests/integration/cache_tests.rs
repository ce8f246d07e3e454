//! Cache and request deduplication integration tests.
//!
//! Tests verify:
//! - Concurrent loads of the same region issue one GET per object
//! - Metadata and listings are fetched once per well level
//! - Clearing caches forces fresh fetches

use std::time::Duration;

use omezarr_loader::{LevelLookup, RegionStatus};

use super::test_utils::{
    chunk_url, loader, paths, well, whole_well, MemoryStore, WellFixture, BF, FLUO_488,
};

#[tokio::test]
async fn test_concurrent_loads_share_fetches() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    store.set_delay(Some(Duration::from_millis(100)));
    let loader = loader(&store);
    let request = whole_well("A1", BF);

    let (first, second) = tokio::join!(loader.load_region(&request), loader.load_region(&request));

    assert_eq!(first.unwrap().status, RegionStatus::Complete);
    assert_eq!(second.unwrap().status, RegionStatus::Complete);

    let paths = paths();
    assert_eq!(store.count_for(&paths.zattrs_url(&well("A1"))), 1);
    assert_eq!(store.count_for(&paths.zarray_url(&well("A1"), 0)), 1);
    assert_eq!(store.count_for(&paths.listing_url(&well("A1"), 0)), 1);
    for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        assert_eq!(store.count_for(&chunk_url("A1", 0, 0, row, col)), 1);
    }
}

#[tokio::test]
async fn test_attributes_shared_across_levels() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    WellFixture::new("A1", 1).full(0, 10).install(&store);
    let loader = loader(&store);

    assert!(loader.level_metadata(&well("A1"), 0).await.metadata().is_some());
    assert!(loader.level_metadata(&well("A1"), 1).await.metadata().is_some());

    assert_eq!(store.count_for(&paths().zattrs_url(&well("A1"))), 1);
    assert_eq!(loader.cache_stats().await.metadata_levels, 2);
}

#[tokio::test]
async fn test_missing_level_is_not_cached() {
    let store = MemoryStore::new();
    let loader = loader(&store);

    let lookup = loader.level_metadata(&well("A1"), 0).await;
    assert!(matches!(lookup, LevelLookup::Unavailable { .. }));

    // The archive appears later and is picked up
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let lookup = loader.level_metadata(&well("A1"), 0).await;
    assert!(lookup.metadata().is_some());
}

#[tokio::test]
async fn test_decoded_chunks_shared_between_channel_sets() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).full(1, 20).install(&store);
    let loader = loader(&store);

    loader.load_region(&whole_well("A1", BF)).await.unwrap();
    let composite = whole_well("A1", BF).with_channels(vec![BF.to_string(), FLUO_488.to_string()]);
    let result = loader.load_region(&composite).await.unwrap();

    assert_eq!(result.loaded_chunks(), 8);
    assert_eq!(store.count_for(&chunk_url("A1", 0, 0, 0, 0)), 1);
    assert_eq!(store.count_for(&chunk_url("A1", 0, 1, 0, 0)), 1);
    assert_eq!(loader.cache_stats().await.chunk_entries, 8);
}

#[tokio::test]
async fn test_clear_caches_forces_refetch() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let loader = loader(&store);

    loader.load_region(&whole_well("A1", BF)).await.unwrap();
    let stats = loader.cache_stats().await;
    assert_eq!(stats.metadata_levels, 1);
    assert_eq!(stats.listings, 1);
    assert_eq!(stats.chunk_entries, 4);
    assert_eq!(stats.chunk_bytes, 4 * 16);

    loader.clear_caches().await;
    let stats = loader.cache_stats().await;
    assert_eq!(stats.metadata_levels, 0);
    assert_eq!(stats.listings, 0);
    assert_eq!(stats.chunk_entries, 0);

    loader.load_region(&whole_well("A1", BF)).await.unwrap();
    assert_eq!(loader.listings_fetched(), 2);
    assert_eq!(store.count_for(&chunk_url("A1", 0, 0, 1, 1)), 2);
}
