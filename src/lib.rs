pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rate_limit;

use crate::api::AppState;
use crate::config::{LogFormat, LoggingConfig, StoreBackend, ThrottleConfig};
use crate::error::{Result, ThrottleError};
use crate::metrics::MetricsService;
use crate::rate_limit::{Clock, MemoryStore, RateLimiterService, SystemClock};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often the in-memory store drops expired records
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Build the rate limiter over the configured state store
pub async fn build_service(config: &ThrottleConfig) -> Result<Arc<RateLimiterService>> {
    let service = match config.store.backend {
        StoreBackend::Redis => {
            info!(url = %config.redis.url, "Using Redis state store");
            RateLimiterService::with_redis(
                &config.redis.url,
                &config.redis.key_prefix,
                config.redis.timeout(),
            )
            .await?
        }
        StoreBackend::Memory => {
            warn!("Using in-memory state store; quotas are not shared across instances");
            let store = Arc::new(MemoryStore::new());
            let clock: Arc<dyn Clock> = Arc::new(SystemClock);
            store.spawn_sweeper(Arc::clone(&clock), SWEEP_INTERVAL);
            RateLimiterService::new(store, clock, config.redis.key_prefix.clone())
        }
    };

    Ok(Arc::new(service))
}

/// Serve the HTTP API until `shutdown` resolves
pub async fn run<F>(config: ThrottleConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    info!("Starting throttle rate limiter");
    info!(version = env!("CARGO_PKG_VERSION"), backend = ?config.store.backend, "Configuration loaded");

    let service = build_service(&config).await?;

    let mut state = AppState::new(service, config.defaults.clone());
    if config.metrics.enabled {
        state = state.with_metrics(MetricsService::install()?);
    }

    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ThrottleError::Internal(format!("Server error: {}", e)))?;

    info!("Throttle rate limiter stopped");
    Ok(())
}

/// Initialize tracing/logging; `RUST_LOG` overrides the configured level
pub fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init(),
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .init(),
    }
}
