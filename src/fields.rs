use std::collections::HashMap;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::backend::TileBackend;
use crate::error::BackendError;
use crate::layer::LayerRegistry;
use crate::query::{self, GEOMETRY_COLUMN};

/// Attribute columns of every layer, discovered once before serving.
///
/// Vector tile encoding needs an explicit attribute list, so the columns of
/// each layer are read once at startup. The cache is never refreshed; a schema change needs a
/// restart.
#[derive(Clone, Debug, Default)]
pub struct FieldCache {
    fields: HashMap<String, Vec<String>>,
}

/// A layer whose column discovery query failed.
#[derive(Debug, thiserror::Error)]
#[error("Unable to discover fields of layer {layer:?}: {source}")]
pub struct FieldDiscoveryError {
    pub layer: String,
    #[source]
    pub source: BackendError,
}

impl FieldCache {
    /// Discovers the columns of every registered layer. Any failure aborts the
    /// whole population.
    pub async fn populate(
        registry: &LayerRegistry,
        backend: &dyn TileBackend,
    ) -> Result<FieldCache, FieldDiscoveryError> {
        let lookups = registry.iter().map(|layer| async move {
            let sample = query::column_sample(layer);
            let columns = backend
                .describe_columns(&sample)
                .await
                .map_err(|source| FieldDiscoveryError {
                    layer: layer.name.clone(),
                    source,
                })?;
            debug!(layer = %layer.name, ?columns, "discovered layer columns");
            Ok::<_, FieldDiscoveryError>((layer.name.clone(), columns))
        });

        let fields = try_join_all(lookups).await?;
        info!(layers = fields.len(), "field cache populated");

        Ok(FieldCache::from_columns(fields))
    }

    /// Builds a cache from known column lists; `geometry` is dropped.
    pub fn from_columns<I>(layers: I) -> FieldCache
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let fields = layers
            .into_iter()
            .map(|(layer, columns)| {
                let mut attributes: Vec<String> = Vec::with_capacity(columns.len());
                for column in columns {
                    if column != GEOMETRY_COLUMN && !attributes.contains(&column) {
                        attributes.push(column);
                    }
                }
                (layer, attributes)
            })
            .collect();

        FieldCache { fields }
    }

    /// Attribute columns of a layer; empty for unknown layers.
    pub fn get(&self, layer: &str) -> &[String] {
        self.fields.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::FakeBackend;
    use crate::query::QueryParam;

    #[tokio::test]
    async fn test_populate_reads_every_layer() {
        let registry = LayerRegistry::builtin().unwrap();
        let backend = FakeBackend::empty().with_columns(&["geometry", "inspireid"]);

        let cache = FieldCache::populate(&registry, &backend).await.unwrap();

        assert_eq!(registry.len(), backend.describe_calls());
        assert_eq!(0, backend.fetch_calls());
        assert_eq!(&["inspireid".to_owned()], cache.get("addresses"));
        assert_eq!(&["inspireid".to_owned()], cache.get("buildings"));
        assert!(cache.get("nonexistent").is_empty());
    }

    #[tokio::test]
    async fn test_populate_fails_fast() {
        let registry = LayerRegistry::builtin().unwrap();
        let backend =
            FakeBackend::failing(BackendError::QueryConstruction("relation does not exist".into()));

        let err = FieldCache::populate(&registry, &backend).await.unwrap_err();
        assert!(matches!(err.source, BackendError::QueryConstruction(_)));
    }

    #[tokio::test]
    async fn test_populate_stays_inside_layer_bounds() {
        let registry = LayerRegistry::from(
            "layers:\n  - name: national\n    bounds: [-9.0, 49.75, 2.01, 61.01]\n    query: SELECT geom AS geometry FROM t WHERE geom && ST_Transform(!bbox!, 27700)\n",
        )
        .unwrap();
        let backend = FakeBackend::empty().with_columns(&["geometry"]);

        FieldCache::populate(&registry, &backend).await.unwrap();

        let sample = backend.last_query().unwrap();
        assert_eq!(
            vec![
                QueryParam::Float(-9.0),
                QueryParam::Float(49.75),
                QueryParam::Float(2.01),
                QueryParam::Float(61.01),
                QueryParam::Int(4326),
            ],
            sample.params
        );
    }

    #[test]
    fn test_geometry_never_cached() {
        let cache = FieldCache::from_columns(vec![(
            "a".to_owned(),
            vec!["geometry".into(), "id".into(), "name".into(), "id".into()],
        )]);
        assert_eq!(&["id".to_owned(), "name".to_owned()], cache.get("a"));
    }
}
