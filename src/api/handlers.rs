use super::extract::{ApiJson, ApiQuery};
use super::models::{CheckRequest, HealthResponse, ResetQuery, ResetResponse, StatusQuery};
use super::AppState;
use crate::error::Result;
use crate::rate_limit::types::{RateLimitDecision, RateLimitStatus};
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Seconds rounded up to a whole number, as HTTP headers expect
fn whole_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.ceil() as u64
    } else {
        0
    }
}

/// `X-RateLimit-*` headers for a decision, plus `Retry-After` on denial
pub fn rate_limit_headers(limit: u64, decision: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(whole_seconds(decision.reset_in_seconds)),
    );

    if let Some(retry) = decision.retry_after {
        headers.insert(header::RETRY_AFTER, HeaderValue::from(whole_seconds(retry)));
    }

    headers
}

/// Check and consume; a denial is still a 200 carrying `allowed: false`
pub async fn check_rate_limit(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CheckRequest>,
) -> Result<Response> {
    let spec = state.defaults.spec_for(
        request.identifier,
        request.algorithm,
        request.limit,
        request.window_seconds,
    );

    let decision = state.service.check(&spec).await?;
    let headers = rate_limit_headers(spec.limit, &decision);

    Ok((StatusCode::OK, headers, Json(decision)).into_response())
}

/// Read a quota without consuming from it
pub async fn rate_limit_status(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<RateLimitStatus>> {
    let spec = state
        .defaults
        .spec_for(identifier, query.algorithm, query.limit, query.window_seconds);

    let status = state.service.status(&spec).await?;
    Ok(Json(status))
}

pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Path(identifier): Path<String>,
    ApiQuery(query): ApiQuery<ResetQuery>,
) -> Result<Json<ResetResponse>> {
    let outcome = state.service.reset(&identifier, query.algorithm).await?;

    Ok(Json(ResetResponse {
        message: format!("Rate limit reset for {}", outcome.identifier),
        cleared: outcome.cleared,
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_connected = state.service.is_healthy().await;

    let (code, status) = if store_connected {
        (StatusCode::OK, "healthy")
    } else {
        warn!(store = state.service.store_name(), "Health check failed: store not connected");
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            store_connected,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Prometheus scrape endpoint
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
