//! Cache diagnostics routes.

use crate::cache::CacheStats;
use crate::server::AppContext;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

pub fn cache_routes() -> Router<AppContext> {
    Router::new()
        .route("/cache/stats", get(get_stats))
        .route("/cache", delete(clear_cache))
}

async fn get_stats(State(ctx): State<AppContext>) -> Json<CacheStats> {
    Json(ctx.cache.stats().await)
}

async fn clear_cache(State(ctx): State<AppContext>) -> Result<StatusCode, (StatusCode, String)> {
    match ctx.cache.reset().await {
        Ok(removed) => {
            tracing::info!("Cleared cache via API ({} entries)", removed);
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => Err((StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}
