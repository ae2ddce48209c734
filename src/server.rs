//! HTTP surface: routing, request handlers and response dispatch.
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info};

use crate::backend::TileBackend;
use crate::error::TileError;
use crate::fields::FieldCache;
use crate::format::{OutputFormat, TileFormat};
use crate::layer::LayerRegistry;
use crate::metadata;
use crate::query::TileQuery;
use crate::tile::{TileRequest, ZoomRange};

/// Read-only state shared by every request.
pub struct AppState {
    pub registry: LayerRegistry,
    pub fields: FieldCache,
    pub zoom_range: ZoomRange,
    pub backend: Arc<dyn TileBackend>,
    /// Base URL advertised in TileJSON; derived from `Host` when unset.
    pub public_url: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/layers", get(layers_handler))
        .route("/:layer/:file", get(tilejson_handler))
        .route("/:layer/:zoom/:column/:file", get(tile_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(metadata::index_page(&state.registry, state.zoom_range))
}

async fn layers_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(metadata::layers_page(&state.registry))
}

async fn tilejson_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((layer, file)): Path<(String, String)>,
) -> Result<Json<metadata::TileJson>, TileError> {
    let format = file.strip_suffix(".json").unwrap_or("");
    let base_url = match &state.public_url {
        Some(url) => url.clone(),
        None => format!("http://{}", request_host(&headers)),
    };

    metadata::tile_json(&state.registry, state.zoom_range, &base_url, &layer, format)
        .map(Json)
        .map_err(|err| {
            debug!(%layer, %file, "rejected tilejson request: {}", err);
            err
        })
}

/// The `Host` header when it is a plain `host[:port]`, else `localhost`.
fn request_host(headers: &HeaderMap) -> &str {
    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
    match host {
        Some(host) if is_plain_authority(host) => host,
        other => {
            debug!(host = ?other, "unusable Host header, advertising localhost");
            "localhost"
        }
    }
}

fn is_plain_authority(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

async fn tile_handler(
    State(state): State<Arc<AppState>>,
    Path((layer, zoom, column, file)): Path<(String, String, String, String)>,
) -> Result<Response, TileError> {
    let (row, ext) = file.rsplit_once('.').unwrap_or((file.as_str(), ""));

    let request = TileRequest::parse(
        &state.registry,
        state.zoom_range,
        &layer,
        ext,
        &zoom,
        &column,
        row,
    )
    .map_err(|err| {
        debug!(%layer, %zoom, %column, %file, "rejected tile request: {}", err);
        err
    })?;

    let bbox = request.bounding_box();
    let query = request
        .format
        .build_query(request.layer, &state.fields, &bbox);

    dispatch(state.backend.as_ref(), &query, request).await
}

/// Runs a built tile query and wraps its scalar result in a response.
pub async fn dispatch(
    backend: &dyn TileBackend,
    query: &TileQuery,
    request: TileRequest<'_>,
) -> Result<Response, TileError> {
    let started = Instant::now();
    let format: OutputFormat = request.format;

    let body = match backend.fetch_tile(query).await {
        Ok(Some(body)) => body,
        Ok(None) => format.empty_payload(),
        Err(err) => {
            error!(
                layer = %request.layer.name,
                z = request.coord.zoom,
                x = request.coord.column,
                y = request.coord.row,
                sql = %query.sql,
                "tile query failed: {}",
                err
            );
            return Err(err.into());
        }
    };

    info!(
        layer = %request.layer.name,
        z = request.coord.zoom,
        x = request.coord.column,
        y = request.coord.row,
        format = format.extension(),
        bytes = body.len(),
        "served tile in {:.2?}",
        started.elapsed()
    );

    Ok(([(header::CONTENT_TYPE, format.mime_type())], body).into_response())
}
