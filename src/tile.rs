//! Slippy map tile addressing: coordinate validation and envelope math.
use crate::error::TileError;
use crate::format::OutputFormat;
use crate::layer::{Layer, LayerRegistry};

/// Half the width of the EPSG:3857 world square, in meters.
pub const WEB_MERCATOR_ORIGIN: f64 = 20_037_508.342_789_244;

/// Tile extent used for vector tile encoding, in tile-local units.
pub const TILE_EXTENT: u32 = 4096;

/// Edge buffer around vector tiles, in tile-local units.
pub const TILE_BUFFER: u32 = 64;

pub const SRID_WGS84: i32 = 4326;
pub const SRID_WEB_MERCATOR: i32 = 3857;

/// Highest zoom level whose grid still fits the coordinate types used.
pub const MAX_SUPPORTED_ZOOM: u8 = 31;

/// A zoom range that cannot be served.
#[derive(Debug, thiserror::Error)]
pub enum ZoomRangeError {
    #[error("min zoom {min} must be below max zoom {max}")]
    Empty { min: u8, max: u8 },
    #[error("max zoom {0} exceeds the supported maximum of {MAX_SUPPORTED_ZOOM}")]
    TooDeep(u8),
}

/// Supported zoom levels; `min` is inclusive and `max` exclusive.
///
/// Always non-empty and never deeper than [`MAX_SUPPORTED_ZOOM`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoomRange {
    min: u8,
    max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<ZoomRange, ZoomRangeError> {
        if min >= max {
            return Err(ZoomRangeError::Empty { min, max });
        }
        if max > MAX_SUPPORTED_ZOOM {
            return Err(ZoomRangeError::TooDeep(max));
        }
        Ok(ZoomRange { min, max })
    }

    pub fn min(&self) -> u8 {
        self.min
    }

    /// Exclusive upper bound.
    pub fn max(&self) -> u8 {
        self.max
    }

    /// Deepest zoom level actually served.
    pub fn last(&self) -> u8 {
        self.max - 1
    }

    pub fn contains(&self, zoom: i64) -> bool {
        i64::from(self.min) <= zoom && zoom < i64::from(self.max)
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        ZoomRange { min: 16, max: 22 }
    }
}

/// A validated XYZ tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoordinate {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

/// Rectangular query envelope in a given spatial reference.
///
/// `margin` is the buffer already added on every side; zero for
/// geographic envelopes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub srid: i32,
    pub margin: f64,
}

impl BoundingBox {
    /// Envelope covering the whole Web Mercator world.
    pub fn world() -> BoundingBox {
        BoundingBox {
            west: -WEB_MERCATOR_ORIGIN,
            south: -WEB_MERCATOR_ORIGIN,
            east: WEB_MERCATOR_ORIGIN,
            north: WEB_MERCATOR_ORIGIN,
            srid: SRID_WEB_MERCATOR,
            margin: 0.0,
        }
    }

    /// Envelope from `[west, south, east, north]` in degrees.
    pub fn geographic(bounds: [f64; 4]) -> BoundingBox {
        let [west, south, east, north] = bounds;
        BoundingBox {
            west,
            south,
            east,
            north,
            srid: SRID_WGS84,
            margin: 0.0,
        }
    }

    /// Computes the envelope for a tile in the reference the format expects.
    pub fn for_tile(coord: &TileCoordinate, format: OutputFormat) -> BoundingBox {
        match format {
            OutputFormat::FeatureCollection => get_epsg_4326_tile_bounds(coord),
            OutputFormat::VectorTile => get_epsg_3857_tile_bounds(
                TILE_EXTENT,
                coord.zoom,
                coord.column,
                coord.row,
                TILE_BUFFER,
            ),
        }
    }

    /// The envelope with its buffer removed.
    pub fn unbuffered(&self) -> BoundingBox {
        BoundingBox {
            west: self.west + self.margin,
            south: self.south + self.margin,
            east: self.east - self.margin,
            north: self.north - self.margin,
            srid: self.srid,
            margin: 0.0,
        }
    }
}

/// Geographic (longitude/latitude) extent of a tile.
pub fn get_epsg_4326_tile_bounds(coord: &TileCoordinate) -> BoundingBox {
    let (west, north) = slippy_map_tilenames::tile2lonlat(coord.column, coord.row, coord.zoom);
    let (east, south) =
        slippy_map_tilenames::tile2lonlat(coord.column + 1, coord.row + 1, coord.zoom);

    BoundingBox {
        west,
        south,
        east,
        north,
        srid: SRID_WGS84,
        margin: 0.0,
    }
}

/// Web Mercator extent of a tile, grown by `buffer` units out of `pixel_scale`.
pub fn get_epsg_3857_tile_bounds(
    pixel_scale: u32,
    zoom: u8,
    x: u32,
    y: u32,
    buffer: u32,
) -> BoundingBox {
    let tile_size = 2.0 * WEB_MERCATOR_ORIGIN / 2f64.powi(i32::from(zoom));
    let margin = tile_size * f64::from(buffer) / f64::from(pixel_scale);

    let west = -WEB_MERCATOR_ORIGIN + f64::from(x) * tile_size;
    let north = WEB_MERCATOR_ORIGIN - f64::from(y) * tile_size;

    BoundingBox {
        west: west - margin,
        south: north - tile_size - margin,
        east: west + tile_size + margin,
        north: north + margin,
        srid: SRID_WEB_MERCATOR,
        margin,
    }
}

/// A tile request whose every part has been checked against the registry
/// and the supported zoom range.
#[derive(Clone, Copy, Debug)]
pub struct TileRequest<'a> {
    pub layer: &'a Layer,
    pub format: OutputFormat,
    pub coord: TileCoordinate,
}

impl<'a> TileRequest<'a> {
    /// Validates raw path segments. Checks run in a fixed order: layer,
    /// format, integer parsing, zoom range, then column/row range.
    pub fn parse(
        registry: &'a LayerRegistry,
        zoom_range: ZoomRange,
        layer: &str,
        format: &str,
        zoom: &str,
        column: &str,
        row: &str,
    ) -> Result<TileRequest<'a>, TileError> {
        let layer = registry
            .get(layer)
            .ok_or_else(|| TileError::UnknownLayer(layer.to_owned()))?;
        let format = OutputFormat::from_extension(format)
            .ok_or_else(|| TileError::UnknownFormat(format.to_owned()))?;
        let coord = validate_coordinate(zoom_range, zoom, column, row)?;

        Ok(TileRequest {
            layer,
            format,
            coord,
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::for_tile(&self.coord, self.format)
    }
}

fn parse_component(name: &str, value: &str) -> Result<i64, TileError> {
    value
        .parse::<i64>()
        .map_err(|_| TileError::MalformedCoordinate(format!("{} {:?} is not an integer", name, value)))
}

/// Checks a zoom/column/row triple. Column and row may be anywhere in
/// `[0, 2^zoom]`, inclusive at both ends.
pub fn validate_coordinate(
    zoom_range: ZoomRange,
    zoom: &str,
    column: &str,
    row: &str,
) -> Result<TileCoordinate, TileError> {
    let zoom = parse_component("zoom", zoom)?;
    let column = parse_component("column", column)?;
    let row = parse_component("row", row)?;

    let zoom_out_of_range = || TileError::ZoomOutOfRange {
        zoom,
        min: zoom_range.min,
        max: zoom_range.max,
    };
    if !zoom_range.contains(zoom) {
        return Err(zoom_out_of_range());
    }

    let zoom_level = u8::try_from(zoom).map_err(|_| zoom_out_of_range())?;
    let limit = 1u64
        .checked_shl(u32::from(zoom_level))
        .ok_or_else(zoom_out_of_range)?;

    let mut grid = [0u32; 2];
    for (slot, (axis, value)) in grid.iter_mut().zip([("X", column), ("Y", row)]) {
        let in_grid = u64::try_from(value)
            .ok()
            .filter(|v| *v <= limit)
            .and_then(|v| u32::try_from(v).ok());
        *slot = in_grid.ok_or(TileError::CoordinateOutOfRange { axis, value, limit })?;
    }

    Ok(TileCoordinate {
        zoom: zoom_level,
        column: grid[0],
        row: grid[1],
    })
}
