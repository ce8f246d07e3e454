//! Region loading integration tests.
//!
//! Tests verify:
//! - Full, sparse and empty regions report the right chunk counts
//! - Chunks missing from the listing are never requested
//! - Missing wells, channels and timepoints are unavailable, not errors
//! - Progressive loads match one-shot loads pixel for pixel
//! - 16-bit and zlib-compressed chunks decode

use omezarr_loader::{OutputFormat, RegionError, RegionRequest, RegionStatus, StageRect};

use super::test_utils::{
    chunk_url, loader, pixel_at, raw_pixels, well, whole_well, MemoryStore, RecordingObserver,
    WellFixture, BF, FLUO_488,
};

// =============================================================================
// Chunk Accounting
// =============================================================================

#[tokio::test]
async fn test_full_region_is_complete() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .chunk(0, 0, 0, 10)
        .chunk(0, 0, 1, 20)
        .chunk(0, 1, 0, 30)
        .chunk(0, 1, 1, 40)
        .install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.status, RegionStatus::Complete);
    assert_eq!(result.loaded_chunks(), 4);
    assert_eq!(result.total_chunks(), 4);

    let (width, height, pixels) = raw_pixels(&result);
    assert_eq!((width, height), (8, 8));
    assert_eq!(pixel_at(&pixels, width, 0, 0), [10, 10, 10, 255]);
    assert_eq!(pixel_at(&pixels, width, 7, 0), [20, 20, 20, 255]);
    assert_eq!(pixel_at(&pixels, width, 0, 7), [30, 30, 30, 255]);
    assert_eq!(pixel_at(&pixels, width, 7, 7), [40, 40, 40, 255]);

    let metadata = result.metadata.unwrap();
    assert_eq!(metadata.candidate_chunks, 4);
    assert_eq!(metadata.pixel_size_um, 250.0);
    assert!(metadata.actual_bounds.is_some());
}

#[tokio::test]
async fn test_sparse_region_leaves_unlisted_quadrant_blank() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .chunk(0, 0, 0, 100)
        .chunk(0, 0, 1, 100)
        .chunk(0, 1, 0, 100)
        .install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.loaded_chunks(), 3);
    assert_eq!(result.total_chunks(), 3);
    assert_eq!(result.metadata.as_ref().unwrap().candidate_chunks, 4);

    let (width, _, pixels) = raw_pixels(&result);
    assert_eq!(pixel_at(&pixels, width, 1, 1), [100, 100, 100, 255]);
    assert_eq!(pixel_at(&pixels, width, 6, 6), [0, 0, 0, 0]);

    // The missing quadrant was never requested
    assert_eq!(store.count_for(&chunk_url("A1", 0, 0, 1, 1)), 0);
}

#[tokio::test]
async fn test_listed_but_missing_chunk_is_partial() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .chunk(0, 0, 0, 50)
        .chunk(0, 0, 1, 50)
        .chunk(0, 1, 0, 50)
        .listed_only(0, 1, 1)
        .install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.status, RegionStatus::Partial);
    assert!(result.success());
    assert_eq!(result.loaded_chunks(), 3);
    assert_eq!(result.total_chunks(), 4);
}

#[tokio::test]
async fn test_failed_chunk_is_partial() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 80).install(&store);
    store.fail(chunk_url("A1", 0, 0, 0, 0));
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.status, RegionStatus::Partial);
    assert_eq!(result.loaded_chunks(), 3);

    let (width, _, pixels) = raw_pixels(&result);
    assert_eq!(pixel_at(&pixels, width, 0, 0), [0, 0, 0, 0]);
    assert_eq!(pixel_at(&pixels, width, 5, 5), [80, 80, 80, 255]);
}

#[tokio::test]
async fn test_region_outside_image_is_empty() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let loader = loader(&store);

    let request = RegionRequest::new(well("A1"), StageRect::new(10.0, 10.0, 1.0, 1.0), BF, 0);
    let result = loader.load_region(&request).await.unwrap();

    assert_eq!(result.status, RegionStatus::Empty);
    assert!(result.data.is_none());
    assert_eq!(result.loaded_chunks(), 0);
    assert_eq!(result.total_chunks(), 0);
    assert!(result.metadata.unwrap().actual_bounds.is_none());
}

#[tokio::test]
async fn test_region_with_no_listed_chunks_is_empty() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).chunk(1, 0, 0, 10).install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.status, RegionStatus::Empty);
    assert_eq!(result.total_chunks(), 0);
    assert_eq!(result.metadata.unwrap().candidate_chunks, 4);
}

#[tokio::test]
async fn test_region_clipped_to_image() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 60).install(&store);
    let loader = loader(&store);

    // Centered on the right edge: only the left half lies inside the image
    let request = RegionRequest::new(well("A1"), StageRect::new(1.0, 0.0, 1.0, 1.0), BF, 0)
        .with_format(OutputFormat::Raw);
    let result = loader.load_region(&request).await.unwrap();

    let metadata = result.metadata.as_ref().unwrap();
    assert_eq!(metadata.requested_pixels.width(), 4);
    assert_eq!(metadata.pixel_window.width(), 2);
    assert_eq!(result.total_chunks(), 2);

    let (width, height, _) = raw_pixels(&result);
    assert_eq!((width, height), (2, 4));
}

// =============================================================================
// Availability
// =============================================================================

#[tokio::test]
async fn test_repeat_request_uses_cached_listing_and_chunks() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let loader = loader(&store);

    loader.load_region(&whole_well("A1", BF)).await.unwrap();
    let gets_after_first = store.get_count();
    assert_eq!(loader.listings_fetched(), 1);

    let second = loader.load_region(&whole_well("A1", BF)).await.unwrap();
    assert_eq!(second.status, RegionStatus::Complete);
    assert_eq!(loader.listings_fetched(), 1);
    assert_eq!(store.get_count(), gets_after_first);
}

#[tokio::test]
async fn test_unknown_well_is_unavailable() {
    let store = MemoryStore::new();
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("H12", BF)).await.unwrap();

    assert!(matches!(result.status, RegionStatus::Unavailable { .. }));
    assert!(result.data.is_none());
    assert!(result.metadata.is_none());
}

#[tokio::test]
async fn test_missing_channel_is_unavailable() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let loader = loader(&store);

    let result = loader
        .load_region(&whole_well("A1", "Fluorescence 730 nm Ex"))
        .await
        .unwrap();

    assert!(matches!(result.status, RegionStatus::Unavailable { .. }));
}

#[tokio::test]
async fn test_timepoint_out_of_range_is_unavailable() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).full(0, 10).install(&store);
    let loader = loader(&store);

    let result = loader
        .load_region(&whole_well("A1", BF).with_timepoint(3))
        .await
        .unwrap();

    assert!(matches!(result.status, RegionStatus::Unavailable { .. }));
}

#[tokio::test]
async fn test_unsupported_dtype_is_an_error() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0).dtype("<f4").install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await;

    assert!(matches!(result, Err(RegionError::UnsupportedDataType(d)) if d == "<f4"));
}

#[tokio::test]
async fn test_invalid_request_is_an_error() {
    let store = MemoryStore::new();
    let loader = loader(&store);

    let request = RegionRequest::new(well("A1"), StageRect::new(0.0, 0.0, -1.0, 1.0), BF, 0);
    let result = loader.load_region(&request).await;

    assert!(matches!(result, Err(RegionError::InvalidRequest(_))));
    assert_eq!(store.get_count(), 0);
}

// =============================================================================
// Composition
// =============================================================================

#[tokio::test]
async fn test_channel_composite_takes_maximum() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .full(0, 90)
        .chunk(1, 0, 0, 200)
        .chunk(1, 1, 1, 20)
        .install(&store);
    let loader = loader(&store);

    let request = whole_well("A1", BF).with_channels(vec![BF.to_string(), FLUO_488.to_string()]);
    let result = loader.load_region(&request).await.unwrap();

    assert_eq!(result.total_chunks(), 6);
    let (width, _, pixels) = raw_pixels(&result);
    assert_eq!(pixel_at(&pixels, width, 0, 0), [200, 200, 200, 255]);
    assert_eq!(pixel_at(&pixels, width, 7, 7), [90, 90, 90, 255]);
}

#[tokio::test]
async fn test_progressive_matches_one_shot() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .chunk(0, 0, 0, 10)
        .chunk(0, 0, 1, 20)
        .chunk(0, 1, 0, 30)
        .install(&store);
    let loader = loader(&store);
    let request = whole_well("A1", BF);

    let one_shot = loader.load_region(&request).await.unwrap();
    loader.clear_caches().await;

    let observer = RecordingObserver::default();
    let progressive = loader
        .load_region_progressive(&request, &observer)
        .await
        .unwrap();

    assert_eq!(raw_pixels(&one_shot).2, raw_pixels(&progressive).2);
    assert_eq!(progressive.status, one_shot.status);

    let progress = observer.progress.lock();
    assert_eq!(progress.len(), 3);
    assert!(progress.iter().all(|&(w, _, total)| w == well("A1") && total == 3));
    assert_eq!(progress.last().map(|p| p.1), Some(3));
}

#[tokio::test]
async fn test_sixteen_bit_chunks_rescale() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .dtype("<u2")
        .chunk(0, 0, 0, u16::MAX)
        .chunk(0, 0, 1, 32768)
        .install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();
    let (width, _, pixels) = raw_pixels(&result);

    assert_eq!(pixel_at(&pixels, width, 0, 0), [255, 255, 255, 255]);
    assert_eq!(pixel_at(&pixels, width, 4, 0), [128, 128, 128, 255]);
}

#[tokio::test]
async fn test_big_endian_zlib_chunks_decode() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .dtype(">u2")
        .zlib()
        .full(0, u16::MAX)
        .install(&store);
    let loader = loader(&store);

    let result = loader.load_region(&whole_well("A1", BF)).await.unwrap();

    assert_eq!(result.status, RegionStatus::Complete);
    let (width, _, pixels) = raw_pixels(&result);
    assert_eq!(pixel_at(&pixels, width, 3, 6), [255, 255, 255, 255]);
}

#[tokio::test]
async fn test_downsampled_level_covers_more_stage() {
    let store = MemoryStore::new();
    WellFixture::new("A1", 1).full(0, 70).install(&store);
    let loader = loader(&store);

    // Level 1 pixels are 1 mm, so the 8-pixel image spans 8 mm
    let request = RegionRequest::new(well("A1"), StageRect::new(0.0, 0.0, 4.0, 4.0), BF, 1)
        .with_format(OutputFormat::Raw);
    let result = loader.load_region(&request).await.unwrap();

    let metadata = result.metadata.as_ref().unwrap();
    assert_eq!(metadata.pixel_size_um, 1000.0);
    assert_eq!((metadata.width, metadata.height), (4, 4));
    assert_eq!(result.total_chunks(), 4);
}
