//! Layer source documents
//!
//! A layer document is a small YAML file listing the layers a server exposes.
//! Each layer pairs a name with a SQL fragment that selects the layer's rows
//! for an envelope. The fragment may only use two placeholders:
//!
//! * `!bbox!` - the request envelope, in the request's spatial reference
//! * `!srid!` - the spatial reference geometry must be returned in
use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::LayerError;
use crate::query;

const BUILTIN_LAYERS: &str = include_str!("../layers.yml");

/// Latitude limit of the Web Mercator projection, in degrees.
const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// A layer document as it appears on disk.
#[derive(Clone, Deserialize, Debug)]
struct LayerDocument {
    layers: Vec<Layer>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Layer {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Extent of the layer's data as `[west, south, east, north]` in degrees.
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
    /// Template as written in the document.
    #[serde(rename = "query")]
    pub template: String,
    /// Template with placeholders replaced by positional parameters.
    #[serde(skip)]
    pub sql: String,
}

/// The immutable set of layers a server exposes, in document order.
#[derive(Clone, Debug)]
pub struct LayerRegistry {
    layers: Vec<Layer>,
}

impl LayerRegistry {
    /// Constructs a registry from a YAML layer document
    pub fn from(data: &str) -> Result<LayerRegistry, LayerError> {
        let document: LayerDocument = serde_yaml::from_str(data)?;
        if document.layers.is_empty() {
            return Err(LayerError::Empty);
        }

        let mut seen = HashSet::new();
        let mut layers = document.layers;
        for layer in layers.iter_mut() {
            // Layer names end up inside SQL text, so only a safe alphabet is accepted
            if !is_safe_name(&layer.name) {
                return Err(LayerError::InvalidName(layer.name.clone()));
            }
            if !seen.insert(layer.name.clone()) {
                return Err(LayerError::Duplicate(layer.name.clone()));
            }
            if !layer.template.contains(query::BBOX_TOKEN) {
                return Err(LayerError::MissingEnvelope(layer.name.clone()));
            }
            if layer.template.contains('$') {
                return Err(LayerError::PositionalParameter(layer.name.clone()));
            }
            if let Some(bounds) = layer.bounds {
                if !is_valid_extent(bounds) {
                    return Err(LayerError::InvalidBounds(layer.name.clone()));
                }
            }

            layer.template = layer.template.trim().trim_end_matches(';').to_owned();
            layer.sql = query::compile_template(&layer.template);
        }

        Ok(LayerRegistry { layers })
    }

    pub fn from_path(path: &Path) -> Result<LayerRegistry, LayerError> {
        let data = std::fs::read_to_string(path)?;
        LayerRegistry::from(&data)
    }

    /// The layers shipped with the server.
    pub fn builtin() -> Result<LayerRegistry, LayerError> {
        LayerRegistry::from(BUILTIN_LAYERS)
    }

    /// Looks up a layer by exact name. This is the allow-list every request
    /// passes through; nothing else resolves a request string to a layer.
    pub fn get(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn is_valid_extent([west, south, east, north]: [f64; 4]) -> bool {
    (-180.0..=180.0).contains(&west)
        && (-180.0..=180.0).contains(&east)
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&south)
        && (-MAX_LATITUDE..=MAX_LATITUDE).contains(&north)
        && west < east
        && south < north
}

fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
