use crate::fields::FieldCache;
use crate::layer::Layer;
use crate::query::{self, TileQuery};
use crate::tile::BoundingBox;

pub const GEOJSON_MIME_TYPE: &str = "application/json";
pub const MVT_MIME_TYPE: &str = "application/vnd.mapbox-vector-tile";

/// The closed set of tile encodings served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    FeatureCollection,
    VectorTile,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::FeatureCollection, OutputFormat::VectorTile];

    /// Looks up a format by its URL extension.
    pub fn from_extension(ext: &str) -> Option<OutputFormat> {
        OutputFormat::ALL.into_iter().find(|f| f.extension() == ext)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::FeatureCollection => "json",
            OutputFormat::VectorTile => "mvt",
        }
    }
}

/// Per-format behavior of the tile pipeline.
pub trait TileFormat {
    fn mime_type(&self) -> &'static str;

    /// Body returned when no rows intersect the tile.
    fn empty_payload(&self) -> Vec<u8>;

    fn build_query(&self, layer: &Layer, fields: &FieldCache, bbox: &BoundingBox) -> TileQuery;
}

impl TileFormat for OutputFormat {
    fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::FeatureCollection => GEOJSON_MIME_TYPE,
            OutputFormat::VectorTile => MVT_MIME_TYPE,
        }
    }

    fn empty_payload(&self) -> Vec<u8> {
        match self {
            OutputFormat::FeatureCollection => br#"{"type":"FeatureCollection","features":[]}"#.to_vec(),
            OutputFormat::VectorTile => Vec::new(),
        }
    }

    fn build_query(&self, layer: &Layer, fields: &FieldCache, bbox: &BoundingBox) -> TileQuery {
        match self {
            OutputFormat::FeatureCollection => query::feature_collection(layer, bbox),
            OutputFormat::VectorTile => query::vector_tile(layer, fields.get(&layer.name), bbox),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions() {
        assert_eq!(Some(OutputFormat::FeatureCollection), OutputFormat::from_extension("json"));
        assert_eq!(Some(OutputFormat::VectorTile), OutputFormat::from_extension("mvt"));
        assert_eq!(None, OutputFormat::from_extension("pbf"));
        assert_eq!(None, OutputFormat::from_extension("JSON"));
    }

    #[test]
    fn test_empty_payloads() {
        let empty: serde_json::Value =
            serde_json::from_slice(&OutputFormat::FeatureCollection.empty_payload()).unwrap();
        assert_eq!("FeatureCollection", empty["type"]);
        assert_eq!(0, empty["features"].as_array().unwrap().len());

        assert!(OutputFormat::VectorTile.empty_payload().is_empty());
    }
}
