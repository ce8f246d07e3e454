//! Router configuration for the region API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Health check
//! GET  /wells/{well}/region             - Region of one well
//! GET  /wells/{well}/levels/{level}     - Level metadata
//! GET  /plate/region                    - Region in plate coordinates
//! GET  /cache/stats                     - Cache sizes
//! POST /cache/clear                     - Drop every cache
//! POST /batches/{batch_id}/cancel       - Cancel one batch
//! POST /batches/cancel                  - Cancel all batches
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use omezarr_loader::server::{create_router, RouterConfig};
//!
//! let loader = Arc::new(RegionLoader::new(store, base_url, dataset, PlateFormat::Wells96, LoaderConfig::default()));
//! let router = create_router(loader, RouterConfig::new().with_cache_max_age(300));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    cache_stats_handler, cancel_all_handler, cancel_batch_handler, clear_cache_handler,
    health_handler, level_handler, plate_region_handler, region_handler, AppState,
};
use crate::io::StoreReader;
use crate::region::RegionLoader;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a router configuration.
    ///
    /// By default CORS allows any origin, rendered regions are cacheable for
    /// 60 seconds and tracing is enabled.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 60,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router over a shared loader.
pub fn create_router<S>(loader: Arc<RegionLoader<S>>, config: RouterConfig) -> Router
where
    S: StoreReader + 'static,
{
    let app_state = AppState::with_cache_max_age(loader, config.cache_max_age);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/wells/{well}/region", get(region_handler::<S>))
        .route("/wells/{well}/levels/{level}", get(level_handler::<S>))
        .route("/plate/region", get(plate_region_handler::<S>))
        .route("/cache/stats", get(cache_stats_handler::<S>))
        .route("/cache/clear", post(clear_cache_handler::<S>))
        .route("/batches/cancel", post(cancel_all_handler::<S>))
        .route("/batches/{batch_id}/cancel", post(cancel_batch_handler::<S>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
