//! SQL composition for tile queries.
//!
//! Only envelope coordinates and spatial reference identifiers are ever
//! bound from a request. Everything spliced into the SQL text (layer names,
//! attribute names, templates) comes from the layer registry or the field
//! cache.
use crate::layer::Layer;
use crate::tile::{BoundingBox, TILE_BUFFER, TILE_EXTENT};

pub const BBOX_TOKEN: &str = "!bbox!";
pub const SRID_TOKEN: &str = "!srid!";

/// Name of the geometry column every layer query must produce.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// A positional query parameter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryParam {
    Float(f64),
    Int(i32),
}

/// A fully composed query plus its parameters, in `$n` order.
#[derive(Clone, Debug, PartialEq)]
pub struct TileQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Rewrites a layer template so the envelope occupies `$1`..`$4` and the
/// spatial reference `$5`.
pub fn compile_template(template: &str) -> String {
    template
        .replace(BBOX_TOKEN, "ST_MakeEnvelope($1, $2, $3, $4, $5)")
        .replace(SRID_TOKEN, "$5")
}

fn envelope_params(bbox: &BoundingBox) -> Vec<QueryParam> {
    vec![
        QueryParam::Float(bbox.west),
        QueryParam::Float(bbox.south),
        QueryParam::Float(bbox.east),
        QueryParam::Float(bbox.north),
        QueryParam::Int(bbox.srid),
    ]
}

/// Quotes a SQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Aggregates every row of the layer into a single GeoJSON FeatureCollection.
/// An empty tile still yields a collection, with an empty feature list.
pub fn feature_collection(layer: &Layer, bbox: &BoundingBox) -> TileQuery {
    let sql = format!(
        "WITH features AS ({}) \
         SELECT json_build_object(\
         'type', 'FeatureCollection', \
         'features', COALESCE(json_agg(ST_AsGeoJSON(features.*)::json), '[]'::json))::text \
         FROM features",
        layer.sql
    );

    TileQuery {
        sql,
        params: envelope_params(bbox),
    }
}

/// Clips the layer's rows to the tile and encodes them as a single MVT layer
/// named after the layer. `fields` lists the attribute columns to carry.
pub fn vector_tile(layer: &Layer, fields: &[String], bbox: &BoundingBox) -> TileQuery {
    let columns: String = fields
        .iter()
        .filter(|field| field.as_str() != GEOMETRY_COLUMN)
        .map(|field| format!(", features.{}", quote_identifier(field)))
        .collect();

    let sql = format!(
        "WITH features AS ({}), \
         tile AS (SELECT ST_AsMVTGeom(features.{geom}, ST_MakeEnvelope($6, $7, $8, $9, $5)::box2d, {extent}, {buffer}, true) AS {geom}{} \
         FROM features) \
         SELECT ST_AsMVT(tile.*, {}, {extent}, '{geom}') FROM tile WHERE tile.{geom} IS NOT NULL",
        layer.sql,
        columns,
        quote_literal(&layer.name),
        geom = GEOMETRY_COLUMN,
        extent = TILE_EXTENT,
        buffer = TILE_BUFFER,
    );

    let tile = bbox.unbuffered();
    let mut params = envelope_params(bbox);
    params.extend([
        QueryParam::Float(tile.west),
        QueryParam::Float(tile.south),
        QueryParam::Float(tile.east),
        QueryParam::Float(tile.north),
    ]);

    TileQuery { sql, params }
}

/// Selects at most one row of the layer, to discover the columns the layer
/// produces. The envelope is the layer's declared bounds, or the whole world
/// for layers without any.
pub fn column_sample(layer: &Layer) -> TileQuery {
    let bbox = layer
        .bounds
        .map(BoundingBox::geographic)
        .unwrap_or_else(BoundingBox::world);

    TileQuery {
        sql: format!("SELECT * FROM ({}) AS sample LIMIT 1", layer.sql),
        params: envelope_params(&bbox),
    }
}
