//! HTTP server layer.
//!
//! Exposes the region loader over a small JSON/PNG API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     GET /wells/{well}/region    GET /plate/region               │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐   │
//! │  │        handlers          │  │          routes            │   │
//! │  │ (query parsing, replies) │  │ (router, CORS, tracing)    │   │
//! │  └──────────────────────────┘  └────────────────────────────┘   │
//! └────────────────────────────────┬────────────────────────────────┘
//!                                  ▼
//!                            RegionLoader
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    AppState, CancelResponse, ErrorResponse, HealthResponse, LevelMetadataResponse,
    PlateRegionResponse, PlateWellResponse, RegionQueryParams, RegionResponse,
};
pub use routes::{create_router, RouterConfig};
