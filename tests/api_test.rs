use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use throttle::api::{self, AppState};
use throttle::config::DefaultsConfig;
use throttle::error::{Result as ThrottleResult, ThrottleError};
use throttle::metrics::MetricsService;
use throttle::rate_limit::store::{
    BucketParams, BucketSnapshot, StateStore, WindowParams, WindowSnapshot,
};
use throttle::rate_limit::{Algorithm, ManualClock, MemoryStore, RateLimiterService};
use tower::ServiceExt;

fn setup_app() -> (Router, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let service = RateLimiterService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
        "throttle",
    );
    let defaults = DefaultsConfig {
        algorithm: Algorithm::TokenBucket,
        limit: 3,
        window_seconds: 60.0,
    };
    let state =
        AppState::new(Arc::new(service), defaults).with_metrics(MetricsService::detached());
    (api::router(state), clock)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };

    (status, headers, value)
}

#[tokio::test]
async fn test_check_allows_then_denies() {
    let (app, _clock) = setup_app();
    let body = json!({"identifier": "user_123", "limit": 2, "window_seconds": 60});

    let (status, headers, json) = send(&app, Method::POST, "/rate-limit/check", Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["allowed"], true);
    assert_eq!(json["remaining"], 1);
    assert_eq!(json["retry_after"], Value::Null);
    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "2");
    assert_eq!(headers.get("x-ratelimit-remaining").unwrap(), "1");
    assert_eq!(headers.get("x-ratelimit-reset").unwrap(), "30");
    assert!(headers.get(header::RETRY_AFTER).is_none());

    send(&app, Method::POST, "/rate-limit/check", Some(body.clone())).await;

    let (status, headers, json) = send(&app, Method::POST, "/rate-limit/check", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["allowed"], false);
    assert_eq!(json["remaining"], 0);
    assert_eq!(json["retry_after"], 30.0);
    assert_eq!(headers.get(header::RETRY_AFTER).unwrap(), "30");
}

#[tokio::test]
async fn test_check_uses_configured_defaults() {
    let (app, _clock) = setup_app();

    let (_, headers, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "defaults"})),
    )
    .await;

    assert_eq!(json["remaining"], 2);
    assert_eq!(headers.get("x-ratelimit-limit").unwrap(), "3");
}

#[tokio::test]
async fn test_check_rejects_invalid_spec() {
    let (app, _clock) = setup_app();

    let (status, _, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "user", "limit": 0})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "INVALID_SPEC");
    assert_eq!(json["status"], 422);
}

#[tokio::test]
async fn test_status_does_not_consume() {
    let (app, clock) = setup_app();
    let body = json!({"identifier": "watcher", "algorithm": "sliding_window"});

    send(&app, Method::POST, "/rate-limit/check", Some(body.clone())).await;

    for _ in 0..3 {
        let (status, _, json) = send(
            &app,
            Method::GET,
            "/rate-limit/status/watcher?algorithm=sliding_window",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["identifier"], "watcher");
        assert_eq!(json["requests_used"], 1);
        assert_eq!(json["remaining"], 2);
        assert_eq!(json["limit"], 3);
        assert_eq!(json["algorithm"], "sliding_window");
    }

    clock.advance(Duration::from_secs(10));
    let (_, _, json) = send(
        &app,
        Method::GET,
        "/rate-limit/status/watcher?algorithm=sliding_window",
        None,
    )
    .await;
    assert_eq!(json["reset_in_seconds"], 50.0);
}

#[tokio::test]
async fn test_reset_clears_state() {
    let (app, _clock) = setup_app();
    let body = json!({"identifier": "admin-target", "limit": 1});

    send(&app, Method::POST, "/rate-limit/check", Some(body.clone())).await;
    let (_, _, json) = send(&app, Method::POST, "/rate-limit/check", Some(body.clone())).await;
    assert_eq!(json["allowed"], false);

    let (status, _, json) = send(&app, Method::DELETE, "/rate-limit/reset/admin-target", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 1);
    assert_eq!(json["message"], "Rate limit reset for admin-target");

    let (_, _, json) = send(&app, Method::POST, "/rate-limit/check", Some(body)).await;
    assert_eq!(json["allowed"], true);
}

#[tokio::test]
async fn test_reset_unknown_identifier_succeeds() {
    let (app, _clock) = setup_app();

    let (status, _, json) = send(
        &app,
        Method::DELETE,
        "/rate-limit/reset/nobody?algorithm=token_bucket",
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], 0);
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, _clock) = setup_app();

    let (status, _, json) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["store_connected"], true);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));

    let (status, headers, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

/// Store whose backend is down
struct DownStore;

#[async_trait::async_trait]
impl StateStore for DownStore {
    async fn eval_token_bucket(&self, _: &str, _: &BucketParams) -> ThrottleResult<BucketSnapshot> {
        Err(ThrottleError::StoreUnavailable("connection refused".to_string()))
    }

    async fn eval_sliding_window(&self, _: &str, _: &WindowParams) -> ThrottleResult<WindowSnapshot> {
        Err(ThrottleError::StoreProtocolError("unexpected reply".to_string()))
    }

    async fn delete(&self, _: &str) -> ThrottleResult<bool> {
        Err(ThrottleError::StoreUnavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> ThrottleResult<()> {
        Err(ThrottleError::StoreUnavailable("connection refused".to_string()))
    }

    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn test_store_failures_are_not_denials() {
    let service = RateLimiterService::new(
        Arc::new(DownStore),
        Arc::new(ManualClock::new(0)),
        "throttle",
    );
    let app = api::router(AppState::new(Arc::new(service), DefaultsConfig::default()));

    let (status, _, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "user"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error_code"], "STORE_UNAVAILABLE");
    assert!(json.get("allowed").is_none());

    let (status, _, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "user", "algorithm": "sliding_window"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["error_code"], "STORE_PROTOCOL_ERROR");

    let (status, _, json) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");

    // metrics disabled: not mounted
    let (status, _, _) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_and_process_time_headers() {
    let (app, _clock) = setup_app();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/rate-limit/check")
        .header(header::ORIGIN, "http://example.com")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"identifier": "browser"}).to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
    let elapsed: f64 = response
        .headers()
        .get("x-process-time")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(elapsed >= 0.0);

    // error responses are stamped too
    let (status, headers, _) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "browser", "limit": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(headers.get("x-process-time").is_some());
}

#[tokio::test]
async fn test_cors_preflight() {
    let (app, _clock) = setup_app();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/rate-limit/check")
        .header(header::ORIGIN, "http://example.com")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .is_some());
}

#[tokio::test]
async fn test_unknown_algorithm_in_query_is_invalid_spec() {
    let (app, _clock) = setup_app();

    for uri in [
        "/rate-limit/status/user?algorithm=fixed_window",
        "/rate-limit/reset/user?algorithm=fixed_window",
    ] {
        let method = if uri.contains("reset") {
            Method::DELETE
        } else {
            Method::GET
        };
        let (status, _, json) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", uri);
        assert_eq!(json["error_code"], "INVALID_SPEC");
        assert_eq!(json["status"], 422);
        assert!(json["detail"].as_str().unwrap().contains("fixed_window"));
    }
}

#[tokio::test]
async fn test_malformed_check_body_is_invalid_spec() {
    let (app, _clock) = setup_app();

    let (status, _, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"limit": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "INVALID_SPEC");
    assert!(json["detail"].as_str().unwrap().contains("identifier"));

    let (status, _, json) = send(
        &app,
        Method::POST,
        "/rate-limit/check",
        Some(json!({"identifier": "user", "algorithm": "leaky_bucket"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error_code"], "INVALID_SPEC");
}
