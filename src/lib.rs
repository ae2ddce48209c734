//! # INSPIRE Tiles
//!
//! An XYZ tile server over a PostGIS database.
//!
//! ## Current features
//!
//! Given a PostGIS database holding the INSPIRE index polygons (or any other
//! table a layer document points at), this crate serves each layer as
//!
//! * GeoJSON FeatureCollections (`/{layer}/{z}/{x}/{y}.json`), and
//! * Mapbox Vector Tiles (`/{layer}/{z}/{x}/{y}.mvt`),
//!
//! along with TileJSON documents (`/{layer}/{format}.json`) for map clients.
//!
//! ## Known Limitations
//!
//! All spatial work (filtering, reprojection, clipping and MVT encoding) is
//! delegated to PostGIS; this crate only validates requests, computes tile
//! envelopes and composes SQL. Layer attribute columns are discovered once at
//! startup, so schema changes require a restart. There is no tile cache.

#![deny(warnings)]

pub mod backend;
pub mod config;
pub mod error;
pub mod fields;
pub mod format;
pub mod layer;
pub mod metadata;
pub mod query;
pub mod server;
pub mod tile;

pub use backend::{PgBackend, PgBackendOptions, TileBackend};
pub use error::{BackendError, LayerError, TileError};
pub use fields::FieldCache;
pub use format::{OutputFormat, TileFormat};
pub use layer::{Layer, LayerRegistry};
pub use tile::{BoundingBox, TileCoordinate, ZoomRange, ZoomRangeError};
