//! HTTP surface of the rate limiter
//!
//! Thin axum handlers over [`RateLimiterService`]; every decision is made by
//! the service, the handlers only fill in defaults and render responses.

pub mod extract;
pub mod handlers;
pub mod models;

use crate::config::DefaultsConfig;
use crate::metrics::MetricsService;
use crate::rate_limit::RateLimiterService;
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Handler latency in milliseconds, stamped on every response
pub const X_PROCESS_TIME: HeaderName = HeaderName::from_static("x-process-time");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RateLimiterService>,
    pub defaults: DefaultsConfig,
    /// `None` when metrics are disabled; `/metrics` is then not mounted
    pub metrics: Option<MetricsService>,
}

impl AppState {
    pub fn new(service: Arc<RateLimiterService>, defaults: DefaultsConfig) -> Self {
        Self {
            service,
            defaults,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/rate-limit/check", post(handlers::check_rate_limit))
        .route(
            "/rate-limit/status/:identifier",
            get(handlers::rate_limit_status),
        )
        .route(
            "/rate-limit/reset/:identifier",
            delete(handlers::reset_rate_limit),
        )
        .route("/health", get(handlers::health_check));

    if state.metrics.is_some() {
        router = router.route("/metrics", get(handlers::metrics_handler));
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(process_time_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Middleware recording how long the inner service took
pub async fn process_time_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    if let Ok(value) = HeaderValue::from_str(&format!("{:.2}", elapsed_ms)) {
        response.headers_mut().insert(X_PROCESS_TIME, value);
    }

    response
}
