//! Segment proxy route.

use crate::loader::{load_to_completion, LoadOutcome, LoaderContext};
use crate::server::AppContext;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

pub fn segment_routes() -> Router<AppContext> {
    Router::new().route("/segment", get(get_segment))
}

#[derive(Deserialize)]
struct SegmentQuery {
    url: String,
}

async fn get_segment(
    State(ctx): State<AppContext>,
    Query(query): Query<SegmentQuery>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let url = reqwest::Url::parse(&query.url)
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Unsupported scheme: {}", url.scheme()),
        ));
    }

    let mut context = LoaderContext::new(query.url.clone());
    if let Some(value) = headers.get(header::RANGE) {
        let (start, end) = value
            .to_str()
            .ok()
            .and_then(parse_range)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "Invalid Range header".to_string()))?;
        context = context.with_byte_range(start, end);
    }

    let partial = context.byte_range.is_some();
    let bypass = partial || !ctx.cache.is_available() || !ctx.matcher.is_cacheable(&query.url);

    let loader = ctx.loaders.create();
    let outcome = load_to_completion(&loader, context, ctx.loader_config).await;
    loader.destroy();

    match outcome {
        LoadOutcome::Success { response, stats } => {
            let disposition = if stats.cached {
                "hit"
            } else if bypass {
                "bypass"
            } else {
                "miss"
            };
            let status = if partial {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            Ok((
                status,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
                    (X_CACHE, HeaderValue::from_static(disposition)),
                ],
                response.data,
            )
                .into_response())
        }
        LoadOutcome::Error { error, .. } => {
            tracing::warn!("Upstream error for {}: {}", query.url, error);
            Err((StatusCode::BAD_GATEWAY, format!("Upstream error: {}", error)))
        }
        LoadOutcome::Timeout { .. } => Err((
            StatusCode::GATEWAY_TIMEOUT,
            "Upstream timed out".to_string(),
        )),
        LoadOutcome::Aborted { .. } => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Load aborted".to_string(),
        )),
    }
}

/// Parse `bytes=<start>-<end>` (inclusive end) into a half-open range.
fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    let end: u64 = end.trim().parse().ok()?;
    (end >= start).then_some((start, end + 1))
}
