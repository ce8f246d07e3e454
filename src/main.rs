//! OME-Zarr region loader binary.
//!
//! Serves the region API, renders single regions to PNG, or checks a well's
//! metadata.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omezarr_loader::{
    config::{CheckConfig, Cli, Command, RenderConfig, ServeConfig, StoreConfig},
    create_http_client,
    server::{create_router, RouterConfig},
    EncodedRaster, HttpStore, LevelLookup, OutputFormat, RegionLoader, RegionRequest,
    RegionStatus, StageRect,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "omezarr_loader=debug,tower_http=debug"
    } else {
        "omezarr_loader=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build a loader over the HTTP store described by `config`.
fn build_loader(config: &StoreConfig) -> Result<RegionLoader<HttpStore>, String> {
    let client = create_http_client(config.request_timeout()).map_err(|e| e.to_string())?;
    let store = HttpStore::new(client, config.base_url.clone());
    Ok(RegionLoader::new(
        store,
        &config.base_url,
        &config.dataset,
        config.plate_format,
        config.loader_config(),
    ))
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("omezarr-loader v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Store: {}", config.store.base_url);
    info!("  Dataset: {}", config.store.dataset);
    info!("  Plate: {}-well", config.store.plate_format);
    info!("  Chunk cache: {}MB", config.store.cache_chunks_mb);

    let loader = match build_loader(&config.store) {
        Ok(loader) => Arc::new(loader),
        Err(e) => {
            error!("Failed to create HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    let router = create_router(loader, router_config);
    let addr = config.bind_address();

    info!("Server listening on http://{}", addr);
    info!("  curl http://{}/health", addr);
    info!("  curl 'http://{}/wells/A1/levels/0'", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let loader = match build_loader(&config.store) {
        Ok(loader) => loader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let channels: Vec<String> = config
        .channel
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let bounds = StageRect::new(config.x_mm, config.y_mm, config.width_mm, config.height_mm);
    let request = RegionRequest::new(config.well, bounds, "", config.level)
        .with_channels(channels)
        .with_timepoint(config.timepoint)
        .with_z(config.z)
        .with_format(OutputFormat::Png);

    let result = match loader.load_region(&request).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match (&result.status, result.data) {
        (RegionStatus::Unavailable { reason }, _) => {
            eprintln!("Well {} level {} is unavailable: {}", config.well, config.level, reason);
            ExitCode::FAILURE
        }
        (RegionStatus::Cancelled, _) => {
            eprintln!("Region load was cancelled");
            ExitCode::FAILURE
        }
        (_, Some(EncodedRaster::Png(png))) => {
            if let Err(e) = tokio::fs::write(&config.output, &png).await {
                eprintln!("Failed to write {}: {}", config.output.display(), e);
                return ExitCode::FAILURE;
            }
            let total = result.metadata.as_ref().map_or(0, |m| m.total_chunks);
            let loaded = result.metadata.as_ref().map_or(0, |m| m.loaded_chunks);
            println!(
                "Wrote {} ({} of {} chunks)",
                config.output.display(),
                loaded,
                total
            );
            ExitCode::SUCCESS
        }
        _ => {
            println!("No data in the requested region; nothing written");
            ExitCode::SUCCESS
        }
    }
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("OME-Zarr Well Check");
    println!("═══════════════════");
    println!();

    if let Err(e) = config.validate() {
        println!("✗ Configuration: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Store: {}", config.store.base_url);
    println!("✓ Dataset: {}", config.store.dataset);
    println!("✓ Plate: {}-well", config.store.plate_format);
    println!();

    let loader = match build_loader(&config.store) {
        Ok(loader) => loader,
        Err(e) => {
            println!("✗ HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Levels of well {}:", config.well);
    println!("─────────────────");

    let mut available = 0;
    for level in 0..=config.max_level {
        match loader.level_metadata(&config.well, level).await {
            LevelLookup::Available(meta) => {
                available += 1;
                let (chunks_x, chunks_y) = meta.array.chunk_grid();
                println!(
                    "  {}: {}x{} px, {}x{} chunks, {} channel(s), {} timepoint(s), {}, {:.3} um/px",
                    level,
                    meta.array.width(),
                    meta.array.height(),
                    chunks_x,
                    chunks_y,
                    meta.array.channel_count(),
                    meta.array.timepoint_count(),
                    meta.array.dtype.as_str(),
                    meta.effective_pixel_size_um()
                );
            }
            LevelLookup::Unavailable { reason } => {
                println!("  {}: unavailable ({})", level, reason);
            }
        }
    }

    println!();
    println!("═══════════════════");
    if available == 0 {
        println!("✗ No level of well {} is readable", config.well);
        return ExitCode::FAILURE;
    }
    println!("✓ {} level(s) readable", available);

    ExitCode::SUCCESS
}
