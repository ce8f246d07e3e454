//! Command-line configuration.
//!
//! Every option can be set on the command line or through an environment
//! variable with the `OMEZARR_` prefix:
//!
//! - `OMEZARR_BASE_URL` - Store base URL (required)
//! - `OMEZARR_DATASET` - Dataset (acquisition) name (required)
//! - `OMEZARR_PLATE_FORMAT` - Plate format: 96, 48 or 24 (default: 96)
//! - `OMEZARR_TIMEOUT` - Per-request timeout in seconds (default: 30)
//! - `OMEZARR_CACHE_CHUNKS_MB` - Decoded-chunk cache size in MB (default: 256)
//! - `OMEZARR_HOST` - Server bind address (default: 0.0.0.0)
//! - `OMEZARR_PORT` - Server port (default: 3000)
//! - `OMEZARR_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 60)
//! - `OMEZARR_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use omezarr_loader::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("listening on {}", config.bind_address()),
//!     Command::Render(config) => println!("rendering {}", config.well),
//!     Command::Check(config) => println!("checking {}", config.well),
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::region::{LoaderConfig, DEFAULT_CHUNK_CACHE_CAPACITY};
use crate::well::{PlateFormat, WellId};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP cache max-age in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 60;

/// Default decoded-chunk cache size in megabytes.
pub const DEFAULT_CACHE_CHUNKS_MB: usize = DEFAULT_CHUNK_CACHE_CAPACITY / (1024 * 1024);

// =============================================================================
// CLI
// =============================================================================

/// OME-Zarr region loader: composites well regions from remote plate archives.
#[derive(Parser, Debug, Clone)]
#[command(name = "omezarr-loader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the region API over HTTP.
    Serve(ServeConfig),

    /// Render one region of one well to a PNG file.
    Render(RenderConfig),

    /// Fetch a well's metadata and print a per-level summary.
    Check(CheckConfig),
}

/// Options shared by every command: where the plate lives.
#[derive(Args, Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the store holding the plate archives.
    #[arg(long, env = "OMEZARR_BASE_URL")]
    pub base_url: String,

    /// Dataset (acquisition) name under the base URL.
    #[arg(long, env = "OMEZARR_DATASET")]
    pub dataset: String,

    /// Plate format: 96, 48 or 24 wells.
    #[arg(long, default_value = "96", env = "OMEZARR_PLATE_FORMAT")]
    pub plate_format: PlateFormat,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "OMEZARR_TIMEOUT")]
    pub timeout: u64,

    /// Decoded-chunk cache size in megabytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_CHUNKS_MB, env = "OMEZARR_CACHE_CHUNKS_MB")]
    pub cache_chunks_mb: usize,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Store base URL is required. Set --base-url or OMEZARR_BASE_URL".to_string());
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(format!("Invalid base URL: {}", self.base_url));
        }
        if self.dataset.is_empty() {
            return Err("Dataset is required. Set --dataset or OMEZARR_DATASET".to_string());
        }
        if self.timeout == 0 {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.cache_chunks_mb == 0 {
            return Err("cache_chunks_mb must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            chunk_cache_bytes: self.cache_chunks_mb * 1024 * 1024,
            ..LoaderConfig::default()
        }
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "OMEZARR_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "OMEZARR_PORT")]
    pub port: u16,

    /// HTTP Cache-Control max-age in seconds for rendered regions.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "OMEZARR_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "OMEZARR_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Render
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    /// Well to render, e.g. B3.
    #[arg(long)]
    pub well: WellId,

    /// Region center x in millimeters, relative to the well center.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub x_mm: f64,

    /// Region center y in millimeters, relative to the well center.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub y_mm: f64,

    #[arg(long)]
    pub width_mm: f64,

    #[arg(long)]
    pub height_mm: f64,

    /// Channel label; repeat or separate with commas for a composite.
    #[arg(long, required = true, value_delimiter = ',')]
    pub channel: Vec<String>,

    /// Pyramid level (0 = full resolution).
    #[arg(long, default_value_t = 0)]
    pub level: u32,

    #[arg(long, default_value_t = 0)]
    pub timepoint: u32,

    #[arg(long, default_value_t = 0)]
    pub z: u32,

    /// Output PNG path.
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        if !(self.width_mm > 0.0 && self.height_mm > 0.0) {
            return Err("width_mm and height_mm must be positive".to_string());
        }
        if self.channel.iter().all(|c| c.trim().is_empty()) {
            return Err("at least one channel is required".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Check
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    /// Well to inspect, e.g. A1.
    #[arg(long)]
    pub well: WellId,

    /// Highest pyramid level to probe.
    #[arg(long, default_value_t = 6)]
    pub max_level: u32,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl CheckConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
