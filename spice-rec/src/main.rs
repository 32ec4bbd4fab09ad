//! spice-rec - multi-catalog "spice up my playlist" recommendation service

use anyhow::{Context, Result};
use clap::Parser;
use spice_common::config::{discover_config, ConfigSource};
use spice_common::logging::init_tracing;
use spice_rec::config::{CliOverrides, ServiceConfig};
use spice_rec::{build_router, AppState};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "spice-rec", version, about = "Multi-catalog music recommendation service")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen port (overrides config)
    #[arg(short, long, env = "SPICE_PORT")]
    port: Option<u16>,

    /// Bind address (overrides config)
    #[arg(short, long, env = "SPICE_BIND")]
    bind: Option<String>,
}

async fn shutdown_signal(token: tokio_util::sync::CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config must load before tracing: it carries the log level
    let loaded = discover_config(cli.config.as_deref(), "spice-rec")?;

    init_tracing(&loaded.config.logging.level)?;

    // Log build identification immediately after tracing init
    info!(
        "Starting spice-rec v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &loaded.source {
        ConfigSource::File(path) => info!("Loaded config from {}", path.display()),
        ConfigSource::Defaults { reason } => warn!("Using default configuration: {}", reason),
    }

    let overrides = CliOverrides {
        port: cli.port,
        bind_address: cli.bind,
    };
    let config = ServiceConfig::resolve(&loaded.config, &overrides)
        .context("Invalid service configuration")?;

    info!(
        workers = config.pipeline.worker_count,
        upstream_timeout_secs = config.pipeline.upstream_timeout.as_secs(),
        resolution = %config.resolution_catalog.kind(),
        "Pipeline configured"
    );

    let state = AppState::from_config(&config).context("Failed to initialize catalogs")?;

    // Warm the Spotify token so the first request does not pay for it
    match &state.catalogs.spotify {
        Some(spotify) => match spotify.warm_up().await {
            Ok(()) => info!("✓ Spotify token acquired"),
            Err(e) => warn!("Spotify token warm-up failed (will retry on demand): {}", e),
        },
        None => info!("Spotify not configured; Spotify endpoints disabled"),
    }

    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;

    info!("spice-rec listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("spice-rec stopped");
    Ok(())
}
