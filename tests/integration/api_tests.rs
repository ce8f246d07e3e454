//! HTTP API integration tests.
//!
//! Tests verify:
//! - Region responses in PNG, base64 and raw formats
//! - Status codes for empty, unavailable and invalid requests
//! - Level metadata, plate regions, cache and batch endpoints

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use omezarr_loader::{create_router, RouterConfig};

use super::test_utils::{loader, MemoryStore, WellFixture};

const BF_QUERY: &str = "channel=BF%20LED%20matrix%20full";

fn router_with_well() -> Router {
    let store = MemoryStore::new();
    WellFixture::new("A1", 0)
        .chunk(0, 0, 0, 10)
        .chunk(0, 0, 1, 20)
        .chunk(0, 1, 0, 30)
        .chunk(0, 1, 1, 40)
        .install(&store);
    create_router(loader(&store), RouterConfig::new().with_tracing(false))
}

async fn get(router: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn post(router: &Router, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    router.clone().oneshot(request).await.unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = router_with_well();
    let response = get(&router, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// Well Regions
// =============================================================================

#[tokio::test]
async fn test_region_png() {
    let router = router_with_well();
    let uri = format!("/wells/A1/region?x_mm=0&y_mm=0&width_mm=2&height_mm=2&{}", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "x-region-status"), "complete");
    assert_eq!(header(&response, "x-loaded-chunks"), "4");
    assert_eq!(header(&response, "x-total-chunks"), "4");
    assert!(header(&response, "cache-control").contains("max-age=60"));

    let body = body_bytes(response).await;
    let image = image::load_from_memory(&body).unwrap();
    assert_eq!((image.width(), image.height()), (8, 8));
}

#[tokio::test]
async fn test_region_raw() {
    let router = router_with_well();
    let uri = format!(
        "/wells/a1/region?width_mm=2&height_mm=2&{}&format=raw",
        BF_QUERY
    );
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/octet-stream");
    assert_eq!(header(&response, "x-raster-width"), "8");
    assert_eq!(header(&response, "x-raster-height"), "8");

    let body = body_bytes(response).await;
    assert_eq!(body.len(), 8 * 8 * 4);
    assert_eq!(&body[..4], &[10, 10, 10, 255]);
}

#[tokio::test]
async fn test_region_base64() {
    let router = router_with_well();
    let uri = format!(
        "/wells/A1/region?x_mm=-0.5&y_mm=-0.5&width_mm=1&height_mm=1&{}&format=base64",
        BF_QUERY
    );
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "complete");
    assert!(json["data_url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
    assert_eq!(json["metadata"]["well"], "A1");
    assert_eq!(json["metadata"]["loaded_chunks"], 1);
    assert_eq!(json["metadata"]["total_chunks"], 1);
    assert_eq!(json["metadata"]["width"], 4);
}

#[tokio::test]
async fn test_region_empty() {
    let router = router_with_well();
    let uri = format!("/wells/A1/region?x_mm=20&width_mm=1&height_mm=1&{}", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-region-status"), "empty");
    let json = body_json(response).await;
    assert_eq!(json["status"], "empty");
    assert!(json.get("data_url").is_none());
    assert_eq!(json["metadata"]["total_chunks"], 0);
}

#[tokio::test]
async fn test_region_unavailable_well() {
    let router = router_with_well();
    let uri = format!("/wells/C4/region?width_mm=1&height_mm=1&{}", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["status"], "unavailable");
    assert!(json["reason"].is_string());
}

#[tokio::test]
async fn test_region_invalid_format() {
    let router = router_with_well();
    let uri = format!("/wells/A1/region?width_mm=1&height_mm=1&{}&format=jpeg", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_format");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_region_invalid_well() {
    let router = router_with_well();
    let uri = format!("/wells/Z99/region?width_mm=1&height_mm=1&{}", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_region_invalid_size() {
    let router = router_with_well();
    let uri = format!("/wells/A1/region?width_mm=0&height_mm=1&{}", BF_QUERY);
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_region_missing_parameters() {
    let router = router_with_well();
    let response = get(&router, "/wells/A1/region?width_mm=1").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Metadata, Plate and Control Endpoints
// =============================================================================

#[tokio::test]
async fn test_level_metadata() {
    let router = router_with_well();
    let response = get(&router, "/wells/A1/levels/0").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["well"], "A1");
    assert_eq!(json["width"], 8);
    assert_eq!(json["chunk_width"], 4);
    assert_eq!(json["chunks_x"], 2);
    assert_eq!(json["channel_count"], 2);
    assert_eq!(json["dtype"], "|u1");
    assert_eq!(json["pixel_size_um"], 250.0);
    assert_eq!(json["channels"]["BF LED matrix full"], 0);
}

#[tokio::test]
async fn test_level_metadata_unavailable() {
    let router = router_with_well();
    let response = get(&router, "/wells/A1/levels/3").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not_found");
}

#[tokio::test]
async fn test_plate_region() {
    let router = router_with_well();
    let uri = format!(
        "/plate/region?x_mm=14.38&y_mm=11.24&width_mm=2&height_mm=2&{}",
        BF_QUERY
    );
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "loaded");
    assert_eq!(json["requested_wells"], 1);
    assert_eq!(json["successful_wells"], 1);
    assert_eq!(json["wells"][0]["well"], "A1");
    assert_eq!(json["wells"][0]["status"], "complete");
    assert!(json["wells"][0]["data_url"].as_str().unwrap().starts_with("data:image/png"));
}

#[tokio::test]
async fn test_plate_region_rejects_png() {
    let router = router_with_well();
    let uri = format!(
        "/plate/region?x_mm=14.38&y_mm=11.24&width_mm=2&height_mm=2&{}&format=png",
        BF_QUERY
    );
    let response = get(&router, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let router = router_with_well();
    let uri = format!("/wells/A1/region?width_mm=2&height_mm=2&{}", BF_QUERY);
    assert_eq!(get(&router, &uri).await.status(), StatusCode::OK);

    let stats = body_json(get(&router, "/cache/stats").await).await;
    assert_eq!(stats["chunk_entries"], 4);
    assert_eq!(stats["listings"], 1);

    let response = post(&router, "/cache/clear").await;
    assert_eq!(response.status(), StatusCode::OK);
    let stats = body_json(response).await;
    assert_eq!(stats["chunk_entries"], 0);
    assert_eq!(stats["metadata_levels"], 0);
}

#[tokio::test]
async fn test_cancel_endpoints() {
    let router = router_with_well();

    let response = post(&router, "/batches/not-a-batch/cancel").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = post(&router, "/batches/cancel").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cancelled"], 0);
}
