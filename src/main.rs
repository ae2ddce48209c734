//! Tile server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inspire_tiles::config::Config;
use inspire_tiles::server::{self, AppState};
use inspire_tiles::{FieldCache, LayerRegistry, PgBackend};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let zoom_range = config.zoom_range()?;
    let registry = match &config.layers {
        Some(path) => LayerRegistry::from_path(path)
            .with_context(|| format!("loading layers from {}", path.display()))?,
        None => LayerRegistry::builtin().context("loading built-in layers")?,
    };
    info!(layers = ?registry.names(), "layer registry loaded");

    let backend = PgBackend::connect(&config.database_url, &config.backend_options())
        .await
        .context("connecting to database")?;

    // No layer is served with an incomplete attribute list
    let fields = FieldCache::populate(&registry, &backend).await?;

    let state = Arc::new(AppState {
        registry,
        fields,
        zoom_range,
        backend: Arc::new(backend.clone()),
        public_url: config.public_url.clone(),
    });
    let app = server::router(state);

    if config.public_url.is_none() {
        warn!("--public-url is not set; TileJSON tile URLs follow the request Host header");
    }

    let addr: SocketAddr = config.listen.parse()?;
    info!(address = %addr, min_zoom = zoom_range.min(), max_zoom = zoom_range.max(), "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    backend.close().await;
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("unable to listen for shutdown signal: {}", err);
    }
}
