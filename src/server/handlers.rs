//! HTTP request handlers for the region API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /wells/{well}/region` - One region of one well
//! - `GET /wells/{well}/levels/{level}` - Level metadata
//! - `GET /plate/region` - Region in plate coordinates, across wells
//! - `GET /cache/stats` - Cache sizes
//! - `POST /cache/clear` - Drop all caches
//! - `POST /batches/{batch_id}/cancel` - Cancel one batch
//! - `POST /batches/cancel` - Cancel every batch

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::RegionError;
use crate::io::StoreReader;
use crate::region::{
    CacheStats, EncodedRaster, OutputFormat, PlateRegionRequest, PlateStatus, RegionLoader,
    RegionMetadata, RegionRequest, RegionResult, RegionStatus, StageRect, WellFailure,
};
use crate::well::{LevelLookup, WellId};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the region loader.
pub struct AppState<S> {
    pub loader: Arc<RegionLoader<S>>,

    /// Cache-Control max-age for rendered regions, in seconds
    pub cache_max_age: u32,
}

impl<S> AppState<S> {
    pub fn new(loader: Arc<RegionLoader<S>>) -> Self {
        Self {
            loader,
            cache_max_age: 60,
        }
    }

    pub fn with_cache_max_age(loader: Arc<RegionLoader<S>>, cache_max_age: u32) -> Self {
        Self {
            loader,
            cache_max_age,
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for region requests.
///
/// Coordinates are millimeters: relative to the well center for
/// `/wells/{well}/region`, plate coordinates for `/plate/region`.
#[derive(Debug, Deserialize)]
pub struct RegionQueryParams {
    /// Region center x
    #[serde(default)]
    pub x_mm: f64,

    /// Region center y
    #[serde(default)]
    pub y_mm: f64,

    pub width_mm: f64,
    pub height_mm: f64,

    /// Channel label, or several separated by commas
    pub channel: String,

    #[serde(default)]
    pub level: u32,

    #[serde(default)]
    pub t: u32,

    #[serde(default)]
    pub z: u32,

    /// `png`, `base64` or `raw`
    #[serde(default)]
    pub format: Option<String>,
}

impl RegionQueryParams {
    fn bounds(&self) -> StageRect {
        StageRect::new(self.x_mm, self.y_mm, self.width_mm, self.height_mm)
    }

    fn channels(&self) -> Vec<String> {
        self.channel
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    }

    fn format(&self, default: OutputFormat) -> Result<OutputFormat, RegionError> {
        match self.format.as_deref() {
            Some(format) => format.parse(),
            None => Ok(default),
        }
    }
}

fn parse_well(well: &str) -> Result<WellId, RegionError> {
    well.parse().map_err(RegionError::InvalidRequest)
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// JSON body of a region response.
#[derive(Debug, Serialize)]
pub struct RegionResponse {
    #[serde(flatten)]
    pub status: RegionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RegionMetadata>,

    /// PNG data URL, when pixel data was produced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
}

impl RegionResponse {
    fn from_result(result: RegionResult) -> Self {
        let data_url = match result.data {
            Some(EncodedRaster::DataUrl(url)) => Some(url),
            _ => None,
        };
        Self {
            status: result.status,
            metadata: result.metadata,
            data_url,
        }
    }
}

/// One well of a plate region response.
#[derive(Debug, Serialize)]
pub struct PlateWellResponse {
    pub well: WellId,
    pub plate_bounds: StageRect,
    pub well_bounds: StageRect,

    #[serde(flatten)]
    pub region: RegionResponse,
}

/// Response from the plate region endpoint.
#[derive(Debug, Serialize)]
pub struct PlateRegionResponse {
    pub status: PlateStatus,
    pub requested_wells: usize,
    pub successful_wells: usize,
    pub wells: Vec<PlateWellResponse>,
    pub skipped: Vec<WellId>,
    pub failures: Vec<WellFailure>,
}

/// Metadata of one pyramid level of one well.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    pub well: WellId,
    pub level: u32,
    pub width: u64,
    pub height: u64,
    pub chunk_width: u64,
    pub chunk_height: u64,
    pub chunks_x: u64,
    pub chunks_y: u64,
    pub channel_count: u64,
    pub timepoint_count: u64,
    pub dtype: &'static str,

    /// Full-resolution pixel size in micrometers
    pub pixel_size_um: f64,

    /// Pixel size at this level in micrometers
    pub level_pixel_size_um: f64,

    /// Channel labels declared by the well (empty when the static table applies)
    pub channels: HashMap<String, u32>,
}

/// Response from the batch cancellation endpoints.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert RegionError to HTTP response.
///
/// Every variant is a client contract error except `Encode`; 4xx errors are
/// logged at WARN, 5xx at ERROR.
impl IntoResponse for RegionError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            RegionError::InvalidOutputFormat(_) => (StatusCode::BAD_REQUEST, "invalid_format"),
            RegionError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            RegionError::UnsupportedDataType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_data_type")
            }
            RegionError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

fn status_code(status: &RegionStatus) -> StatusCode {
    match status {
        RegionStatus::Complete | RegionStatus::Partial | RegionStatus::Empty => StatusCode::OK,
        RegionStatus::Unavailable { .. } => StatusCode::NOT_FOUND,
        RegionStatus::Cancelled => StatusCode::CONFLICT,
    }
}

fn status_name(status: &RegionStatus) -> &'static str {
    match status {
        RegionStatus::Complete => "complete",
        RegionStatus::Partial => "partial",
        RegionStatus::Empty => "empty",
        RegionStatus::Unavailable { .. } => "unavailable",
        RegionStatus::Cancelled => "cancelled",
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// `GET /health` returns `{"status": "healthy", "version": "..."}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle one-well region requests.
///
/// # Endpoint
///
/// `GET /wells/{well}/region?x_mm=&y_mm=&width_mm=&height_mm=&channel=&level=&t=&z=&format=`
///
/// # Response
///
/// - `format=png`: `200 OK` with `Content-Type: image/png`
/// - `format=raw`: `200 OK` with RGBA bytes and `X-Raster-Width`/`X-Raster-Height`
/// - `format=base64`: `200 OK` with a JSON [`RegionResponse`]
/// - No data in the region: `200 OK` JSON with `"status": "empty"`
/// - Well or level unavailable: `404 Not Found` JSON
/// - Cancelled by a batch cancellation: `409 Conflict` JSON
///
/// Pixel responses carry `X-Region-Status`, `X-Loaded-Chunks` and
/// `X-Total-Chunks`.
pub async fn region_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
    Path(well): Path<String>,
    Query(query): Query<RegionQueryParams>,
) -> Result<Response, RegionError> {
    let well = parse_well(&well)?;
    let format = query.format(state.loader.config().default_format)?;
    let request = RegionRequest::new(well, query.bounds(), "", query.level)
        .with_channels(query.channels())
        .with_timepoint(query.t)
        .with_z(query.z)
        .with_format(format);

    let result = state.loader.load_region(&request).await?;
    debug!(
        well = %well,
        status = status_name(&result.status),
        loaded = result.loaded_chunks(),
        total = result.total_chunks(),
        "Region request served"
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-region-status"),
        HeaderValue::from_static(status_name(&result.status)),
    );
    headers.insert(
        HeaderName::from_static("x-loaded-chunks"),
        HeaderValue::from(result.loaded_chunks()),
    );
    headers.insert(
        HeaderName::from_static("x-total-chunks"),
        HeaderValue::from(result.total_chunks()),
    );

    match result.data {
        Some(EncodedRaster::Png(png)) => {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
            insert_cache_control(&mut headers, state.cache_max_age);
            Ok((StatusCode::OK, headers, Body::from(png)).into_response())
        }
        Some(EncodedRaster::Raw {
            width,
            height,
            pixels,
        }) => {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            headers.insert(HeaderName::from_static("x-raster-width"), HeaderValue::from(width));
            headers.insert(HeaderName::from_static("x-raster-height"), HeaderValue::from(height));
            insert_cache_control(&mut headers, state.cache_max_age);
            Ok((StatusCode::OK, headers, Body::from(pixels)).into_response())
        }
        _ => {
            let status = status_code(&result.status);
            Ok((status, headers, Json(RegionResponse::from_result(result))).into_response())
        }
    }
}

fn insert_cache_control(headers: &mut HeaderMap, max_age: u32) {
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", max_age)) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

/// Handle plate-coordinate region requests.
///
/// # Endpoint
///
/// `GET /plate/region?x_mm=&y_mm=&width_mm=&height_mm=&channel=&level=&t=&z=`
///
/// Each well's raster is returned as a PNG data URL. When no well in the
/// region has data the status is `"no_data"`.
pub async fn plate_region_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
    Query(query): Query<RegionQueryParams>,
) -> Result<Json<PlateRegionResponse>, RegionError> {
    if let Some(format) = query.format.as_deref() {
        if format.parse::<OutputFormat>()? != OutputFormat::Base64 {
            return Err(RegionError::InvalidOutputFormat(format!(
                "{} (plate regions are returned as base64)",
                format
            )));
        }
    }

    let mut request = PlateRegionRequest::new(query.bounds(), "", query.level)
        .with_format(OutputFormat::Base64)
        .with_timepoint(query.t);
    request.channels = query.channels();
    request.z = query.z;
    if request.channels.is_empty() {
        return Err(RegionError::InvalidRequest(
            "at least one channel is required".to_string(),
        ));
    }

    let result = state.loader.load_plate_region(&request).await?;
    let successful_wells = result.successful_wells();

    Ok(Json(PlateRegionResponse {
        status: result.status,
        requested_wells: result.requested_wells,
        successful_wells,
        wells: result
            .wells
            .into_iter()
            .map(|w| PlateWellResponse {
                well: w.region.well,
                plate_bounds: w.region.plate_bounds,
                well_bounds: w.region.well_bounds,
                region: RegionResponse::from_result(w.result),
            })
            .collect(),
        skipped: result.skipped,
        failures: result.failures,
    }))
}

/// Handle level metadata requests.
///
/// `GET /wells/{well}/levels/{level}`; `404 Not Found` when the level is
/// unavailable.
pub async fn level_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
    Path((well, level)): Path<(String, u32)>,
) -> Result<Response, RegionError> {
    let well = parse_well(&well)?;

    let meta = match state.loader.level_metadata(&well, level).await {
        LevelLookup::Available(meta) => meta,
        LevelLookup::Unavailable { reason } => {
            debug!(well = %well, level, reason = %reason, "Level unavailable");
            let body = ErrorResponse::with_status("not_found", reason, StatusCode::NOT_FOUND);
            return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
        }
    };

    let (chunks_x, chunks_y) = meta.array.chunk_grid();
    Ok(Json(LevelMetadataResponse {
        well,
        level,
        width: meta.array.width(),
        height: meta.array.height(),
        chunk_width: meta.array.chunk_width(),
        chunk_height: meta.array.chunk_height(),
        chunks_x,
        chunks_y,
        channel_count: meta.array.channel_count(),
        timepoint_count: meta.array.timepoint_count(),
        dtype: meta.array.dtype.as_str(),
        pixel_size_um: meta.attributes.pixel_size_um,
        level_pixel_size_um: meta.effective_pixel_size_um(),
        channels: meta.attributes.channels.labels().clone(),
    })
    .into_response())
}

/// `GET /cache/stats`
pub async fn cache_stats_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
) -> Json<CacheStats> {
    Json(state.loader.cache_stats().await)
}

/// `POST /cache/clear`; returns the (now empty) cache stats.
pub async fn clear_cache_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
) -> Json<CacheStats> {
    state.loader.clear_caches().await;
    Json(state.loader.cache_stats().await)
}

/// `POST /batches/{batch_id}/cancel`; `404 Not Found` if the batch is not
/// running.
pub async fn cancel_batch_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
    Path(batch_id): Path<String>,
) -> Response {
    if state.loader.cancel_batch(&batch_id) {
        Json(CancelResponse { cancelled: 1 }).into_response()
    } else {
        let body = ErrorResponse::with_status(
            "not_found",
            format!("No running batch {}", batch_id),
            StatusCode::NOT_FOUND,
        );
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    }
}

/// `POST /batches/cancel`
pub async fn cancel_all_handler<S: StoreReader + 'static>(
    State(state): State<AppState<S>>,
) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.loader.cancel_all(),
    })
}
