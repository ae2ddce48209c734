//! TileJSON documents and the human-readable pages.
use serde::Serialize;

use crate::error::TileError;
use crate::format::OutputFormat;
use crate::layer::LayerRegistry;
use crate::tile::ZoomRange;

pub const TILEJSON_VERSION: &str = "2.2.0";

/// TileJSON 2.2.0 discovery document for one layer in one format.
#[derive(Clone, Debug, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub scheme: &'static str,
    pub format: &'static str,
    pub tiles: Vec<String>,
    pub minzoom: u8,
    pub maxzoom: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<[f64; 4]>,
}

/// Builds the TileJSON for `layer` in `format`, resolving tile URLs against
/// `base_url` (scheme and authority, no trailing slash).
pub fn tile_json(
    registry: &LayerRegistry,
    zoom_range: ZoomRange,
    base_url: &str,
    layer: &str,
    format: &str,
) -> Result<TileJson, TileError> {
    let layer = registry
        .get(layer)
        .ok_or_else(|| TileError::UnknownLayer(layer.to_owned()))?;
    let format = OutputFormat::from_extension(format)
        .ok_or_else(|| TileError::UnknownFormat(format.to_owned()))?;

    Ok(TileJson {
        tilejson: TILEJSON_VERSION,
        name: layer.name.clone(),
        description: layer.description.clone(),
        scheme: "xyz",
        format: format.extension(),
        tiles: vec![format!(
            "{}/{}/{{z}}/{{x}}/{{y}}.{}",
            base_url.trim_end_matches('/'),
            layer.name,
            format.extension()
        )],
        minzoom: zoom_range.min(),
        maxzoom: zoom_range.max(),
        bounds: layer.bounds,
    })
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n"
    )
}

/// HTML listing of every layer with links to its TileJSON documents.
pub fn layers_page(registry: &LayerRegistry) -> String {
    let mut body = String::from("<ul>\n");
    for layer in registry.iter() {
        let links: Vec<String> = OutputFormat::ALL
            .iter()
            .map(|format| {
                format!(
                    "<a href=\"/{name}/{ext}.json\">{ext}</a>",
                    name = layer.name,
                    ext = format.extension()
                )
            })
            .collect();
        body.push_str(&format!("<li><strong>{}</strong>", escape_html(&layer.name)));
        if let Some(description) = &layer.description {
            body.push_str(&format!(" - {}", escape_html(description)));
        }
        body.push_str(&format!(" ({})</li>\n", links.join(", ")));
    }
    body.push_str("</ul>\n");

    page("Layers", &body)
}

pub fn index_page(registry: &LayerRegistry, zoom_range: ZoomRange) -> String {
    let body = format!(
        "<p>Serving {} layers at zoom levels {} to {}.</p>\n\
         <p>Tiles: <code>/{{layer}}/{{z}}/{{x}}/{{y}}.{{json|mvt}}</code></p>\n\
         <p><a href=\"/layers\">Browse layers</a></p>\n",
        registry.len(),
        zoom_range.min(),
        zoom_range.last()
    );

    page("Tile server", &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LayerRegistry {
        LayerRegistry::builtin().unwrap()
    }

    #[test]
    fn test_tile_json() {
        let range = ZoomRange::new(16, 22).unwrap();
        let doc = tile_json(&registry(), range, "http://localhost:8000/", "addresses", "mvt").unwrap();

        assert_eq!(16, doc.minzoom);
        assert_eq!(22, doc.maxzoom);
        assert_eq!(
            vec!["http://localhost:8000/addresses/{z}/{x}/{y}.mvt".to_owned()],
            doc.tiles
        );

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!("2.2.0", value["tilejson"]);
        let template = value["tiles"][0].as_str().unwrap();
        for placeholder in ["{z}", "{x}", "{y}"] {
            assert!(template.contains(placeholder));
        }
        assert_eq!(-9.0, value["bounds"][0]);

        let unbounded = LayerRegistry::from(
            "layers:\n  - name: a\n    query: SELECT geometry FROM t WHERE geometry && !bbox!\n",
        )
        .unwrap();
        let value = serde_json::to_value(tile_json(&unbounded, range, "", "a", "json").unwrap()).unwrap();
        assert!(value.get("bounds").is_none());
    }

    #[test]
    fn test_index_page_single_zoom() {
        let html = index_page(&registry(), ZoomRange::new(0, 1).unwrap());
        assert!(html.contains("zoom levels 0 to 0"));
    }

    #[test]
    fn test_tile_json_validation() {
        let range = ZoomRange::default();
        assert!(matches!(
            tile_json(&registry(), range, "", "nonexistent", "json"),
            Err(TileError::UnknownLayer(_))
        ));
        assert!(matches!(
            tile_json(&registry(), range, "", "addresses", "png"),
            Err(TileError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_layers_page_escapes_descriptions() {
        let registry = LayerRegistry::from(
            "layers:\n  - name: a\n    description: \"<b>&</b>\"\n    query: SELECT geometry FROM t WHERE geometry && !bbox!\n",
        )
        .unwrap();
        let html = layers_page(&registry);
        assert!(html.contains("&lt;b&gt;&amp;&lt;/b&gt;"));
        assert!(html.contains("href=\"/a/mvt.json\""));
    }
}
