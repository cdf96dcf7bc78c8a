use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::{
    error::AppError,
    models::{CacheStatus, Catalog, CatalogKind, SourceCounts},
    AppState,
};

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/catalog/:kind", get(get_catalog))
        .route("/cache/status", get(cache_status))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/reload/:kind", post(reload_catalog))
        .route("/sources/reload", post(reload_sources))
        .with_state(state)
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", routes(state.clone()))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn parse_kind(raw: &str) -> Result<CatalogKind, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> AppError {
    AppError::NotFound
}

async fn get_catalog(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Catalog>, AppError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.catalog.get_catalog(kind).await))
}

async fn cache_status(State(state): State<AppState>) -> Json<BTreeMap<CatalogKind, CacheStatus>> {
    Json(state.catalog.cache_status().await.into_iter().collect())
}

#[derive(Deserialize)]
struct ClearQuery {
    kind: Option<String>,
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearQuery>,
) -> Result<Json<Value>, AppError> {
    let scope = match params.kind.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(parse_kind(raw)?),
    };

    state.catalog.clear(scope).await;

    let cleared: Vec<CatalogKind> = match scope {
        Some(kind) => vec![kind],
        None => CatalogKind::ALL.to_vec(),
    };
    Ok(Json(json!({ "cleared": cleared })))
}

async fn reload_catalog(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, AppError> {
    let catalog = state.catalog.reload(parse_kind(&kind)?).await;
    Ok(Json(json!({ "kind": catalog.kind(), "item_count": catalog.len() })))
}

async fn reload_sources(State(state): State<AppState>) -> Json<SourceCounts> {
    Json(state.catalog.reload_sources().await)
}
