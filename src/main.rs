//! tilestash - offline map tile cache.
//!
//! This binary wires the store, fetcher and cache manager together for each
//! subcommand.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilestash::{
    config::{
        AreaConfig, BoundaryConfig, Cli, Command, JobArgs, ServeConfig, SourceArgs, StoreArgs,
        StoreConfig,
    },
    format_bytes,
    server::create_router,
    CacheManager, DiskTileStore, Geometry, HttpTileFetcher, JobError, JobState, JobSummary,
    TileStore,
};

/// How often a running CLI job reports progress.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Area(config) => run_area(config).await,
        Command::Boundary(config) => run_boundary(config).await,
        Command::Serve(config) => run_serve(config).await,
        Command::Stats(config) => run_stats(config).await,
        Command::Clear(config) => run_clear(config).await,
    }
}

// =============================================================================
// Cache Commands
// =============================================================================

async fn run_area(config: AreaConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }
    let bbox = match config.bounding_box() {
        Ok(bbox) => bbox,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let manager = match build_manager(&config.store, &config.source, &config.job) {
        Ok(manager) => manager,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let handle = manager.spawn_area(bbox, &config.job.zoom).await;
    drive_job(&manager, handle).await
}

async fn run_boundary(config: BoundaryConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let geometry = match read_boundary(&config.file).await {
        Ok(geometry) => geometry,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let manager = match build_manager(&config.store, &config.source, &config.job) {
        Ok(manager) => manager,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let handle = manager
        .spawn_boundary(&geometry, &config.job.zoom, Some(config.job.margin))
        .await;
    drive_job(&manager, handle).await
}

async fn read_boundary(path: &Path) -> Result<Geometry, String> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Geometry::from_geojson(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Wait for a spawned job, logging progress and cancelling on Ctrl-C.
async fn drive_job(
    manager: &Arc<CacheManager>,
    handle: Result<JoinHandle<JobSummary>, JobError>,
) -> ExitCode {
    let mut handle = match handle {
        Ok(handle) => handle,
        Err(e) => {
            error!("Cache job rejected: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    ticker.tick().await;
    let mut interrupted = false;

    let summary = loop {
        tokio::select! {
            joined = &mut handle => match joined {
                Ok(summary) => break summary,
                Err(e) => {
                    error!("Cache job task failed: {}", e);
                    return ExitCode::FAILURE;
                }
            },
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    continue;
                }
                if manager.cancel().await {
                    warn!("Interrupted, stopping after the current batch");
                }
            },
            _ = ticker.tick() => {
                let progress = manager.progress().await;
                info!(
                    "  {}/{} tiles ({:.1}%)",
                    progress.completed, progress.total, progress.percent
                );
            }
        }
    };

    print_summary(&summary);

    match summary.state {
        JobState::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    }
}

fn print_summary(summary: &JobSummary) {
    println!();
    println!("Cache job {}", summary.state);
    println!("─────────────────");
    println!("  Total tiles:     {}", summary.total_tiles);
    println!("  Attempted:       {}", summary.attempted_tiles);
    println!("  Cached:          {}", summary.cached_tiles);
    println!("  Failed:          {}", summary.failed_tiles);
    if let Some(failure) = &summary.failure {
        println!("  Reason:          {}", failure);
    }
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

    let manager = match build_manager(&config.store, &config.source, &config.job) {
        Ok(manager) => manager,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("tilestash v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Tile source: {}", manager.template());
    info!("  Zoom levels: {:?}", manager.options().zoom_levels);
    info!(
        "  Pacing: {} tiles/batch, {}ms between batches",
        manager.options().concurrency,
        manager.options().inter_batch_delay.as_millis()
    );
    match manager.cached_tile_count().await {
        Ok(count) => info!("  Cached tiles: {}", count),
        Err(e) => warn!("  Cached tiles: unknown ({})", e),
    }

    let router = create_router(manager, config.router_config());
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/cache", addr);
    info!("    curl http://{}/cache/progress", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

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
// Store Commands
// =============================================================================

async fn run_stats(config: StoreConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let store = match open_store(&config.store) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let keys = match store.keys().await {
        Ok(keys) => keys,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let size = match store.total_size_bytes().await {
        Ok(size) => size,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Cache directory: {}", store.root().display());
    println!("Tiles:           {}", keys.len());
    println!("Size:            {}", format_bytes(size));

    ExitCode::SUCCESS
}

async fn run_clear(config: StoreConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let store = match open_store(&config.store) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = store.clear().await {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    println!("Cleared {}", store.root().display());
    ExitCode::SUCCESS
}

// =============================================================================
// Wiring
// =============================================================================

fn open_store(args: &StoreArgs) -> Result<DiskTileStore, String> {
    let root = args.resolve_cache_dir()?;
    DiskTileStore::new(root.clone()).map_err(|e| format!("Failed to open {}: {}", root.display(), e))
}

fn build_manager(
    store: &StoreArgs,
    source: &SourceArgs,
    job: &JobArgs,
) -> Result<Arc<CacheManager>, String> {
    let store = open_store(store)?;
    info!("Cache directory: {}", store.root().display());

    let template = source.template()?;
    let fetcher = HttpTileFetcher::with_timeout(source.timeout())
        .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

    let manager = CacheManager::new(
        Arc::new(store),
        Arc::new(fetcher),
        template,
        job.job_options(source),
    )
    .map_err(|e| format!("Configuration error: {}", e))?;

    Ok(Arc::new(manager))
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tilestash=debug,tower_http=debug"
    } else {
        "tilestash=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
