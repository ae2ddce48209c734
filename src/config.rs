//! Command line and environment configuration.
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::backend::PgBackendOptions;
use crate::tile::ZoomRange;

#[derive(Parser, Debug)]
#[command(name = "inspire-tiles")]
#[command(about = "XYZ tile server for GeoJSON and Mapbox Vector Tiles backed by PostGIS")]
pub struct Config {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Listen address
    #[arg(short, long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: String,

    /// YAML layer document; the built-in layers are served when omitted
    #[arg(long, env = "LAYERS")]
    pub layers: Option<PathBuf>,

    /// Lowest zoom level served (inclusive)
    #[arg(long, env = "MIN_ZOOM", default_value_t = 16)]
    pub min_zoom: u8,

    /// Zoom level above the highest served (exclusive)
    #[arg(long, env = "MAX_ZOOM", default_value_t = 22)]
    pub max_zoom: u8,

    /// Maximum number of pooled database connections
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    /// Per-query timeout enforced by the database, in milliseconds
    #[arg(long, env = "STATEMENT_TIMEOUT_MS", default_value_t = 5000)]
    pub statement_timeout_ms: u64,

    /// How long to wait for a free pooled connection, in milliseconds
    #[arg(long, env = "ACQUIRE_TIMEOUT_MS", default_value_t = 5000)]
    pub acquire_timeout_ms: u64,

    /// Base URL advertised in TileJSON documents, e.g. https://tiles.example.com
    #[arg(long, env = "PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn zoom_range(&self) -> Result<ZoomRange> {
        Ok(ZoomRange::new(self.min_zoom, self.max_zoom)?)
    }

    pub fn backend_options(&self) -> PgBackendOptions {
        PgBackendOptions {
            max_connections: self.max_connections,
            statement_timeout: Duration::from_millis(self.statement_timeout_ms),
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
        }
    }
}
