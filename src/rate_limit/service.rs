use super::clock::{Clock, SystemClock};
use super::memory::MemoryStore;
use super::redis::RedisStore;
use super::sliding_window::SlidingWindowLimiter;
use super::store::StateStore;
use super::token_bucket::TokenBucketLimiter;
use super::types::{
    validate_identifier, Algorithm, RateLimitDecision, RateLimitSpec, RateLimitStatus,
    ResetOutcome,
};
use crate::error::{Result, ThrottleError};
use crate::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default namespace for store keys
pub const DEFAULT_KEY_PREFIX: &str = "throttle";

/// Single entry point for rate limit decisions.
///
/// Validates the spec, dispatches to the limiter named by its algorithm and
/// hands back that limiter's result unchanged. Holds no quota state itself.
pub struct RateLimiterService {
    token_bucket: TokenBucketLimiter,
    sliding_window: SlidingWindowLimiter,
    store: Arc<dyn StateStore>,
}

impl RateLimiterService {
    /// Create a service over any state store
    pub fn new(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        key_prefix: impl Into<String>,
    ) -> Self {
        let key_prefix = key_prefix.into();
        info!(store = store.name(), prefix = %key_prefix, "Initializing rate limiter");

        Self {
            token_bucket: TokenBucketLimiter::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                key_prefix.clone(),
            ),
            sliding_window: SlidingWindowLimiter::new(Arc::clone(&store), clock, key_prefix),
            store,
        }
    }

    /// Create a service backed by process-local memory (single instance only)
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            DEFAULT_KEY_PREFIX,
        )
    }

    /// Create a service backed by Redis, shared by every instance pointing at it
    pub async fn with_redis(redis_url: &str, key_prefix: &str, timeout: Duration) -> Result<Self> {
        let store = RedisStore::connect(redis_url, timeout).await?;
        store.ping().await?;
        Ok(Self::new(Arc::new(store), Arc::new(SystemClock), key_prefix))
    }

    /// Check a request against its quota, consuming one unit when allowed
    pub async fn check(&self, spec: &RateLimitSpec) -> Result<RateLimitDecision> {
        spec.validate()?;

        let started = Instant::now();
        let result = match spec.algorithm {
            Algorithm::TokenBucket => self.token_bucket.check(spec).await,
            Algorithm::SlidingWindow => self.sliding_window.check(spec).await,
        };
        metrics::record_store_duration(spec.algorithm.as_str(), started.elapsed().as_secs_f64());

        match &result {
            Ok(decision) if !decision.allowed => {
                metrics::record_decision(spec.algorithm.as_str(), false);
                warn!(
                    identifier = %spec.identifier,
                    algorithm = %spec.algorithm,
                    limit = spec.limit,
                    window_seconds = spec.window_seconds,
                    retry_after = ?decision.retry_after,
                    "Rate limit exceeded"
                );
            }
            Ok(decision) => {
                metrics::record_decision(spec.algorithm.as_str(), true);
                debug!(
                    identifier = %spec.identifier,
                    algorithm = %spec.algorithm,
                    limit = spec.limit,
                    window_seconds = spec.window_seconds,
                    remaining = decision.remaining,
                    "Rate limit checked"
                );
            }
            Err(e) => self.report_failure("check", spec, e),
        }

        result
    }

    /// Read the quota without consuming from it
    pub async fn status(&self, spec: &RateLimitSpec) -> Result<RateLimitStatus> {
        spec.validate()?;

        let result = match spec.algorithm {
            Algorithm::TokenBucket => self.token_bucket.status(spec).await,
            Algorithm::SlidingWindow => self.sliding_window.status(spec).await,
        };

        if let Err(e) = &result {
            self.report_failure("status", spec, e);
        }

        result
    }

    /// Clear stored state for `identifier`; `None` clears every algorithm.
    ///
    /// Resetting an identifier that was never seen succeeds with `cleared == 0`.
    pub async fn reset(
        &self,
        identifier: &str,
        algorithm: Option<Algorithm>,
    ) -> Result<ResetOutcome> {
        validate_identifier(identifier)?;

        let algorithms = match algorithm {
            Some(algorithm) => vec![algorithm],
            None => Algorithm::ALL.to_vec(),
        };

        let mut cleared = 0;
        for algorithm in algorithms {
            let deleted = match algorithm {
                Algorithm::TokenBucket => self.token_bucket.reset(identifier).await,
                Algorithm::SlidingWindow => self.sliding_window.reset(identifier).await,
            }
            .map_err(|e| {
                error!(identifier = %identifier, algorithm = %algorithm, error = %e, "Reset failed");
                metrics::record_store_error(e.error_code());
                e
            })?;

            if deleted {
                cleared += 1;
            }
        }

        metrics::record_reset(cleared);
        info!(identifier = %identifier, cleared, "Rate limit reset");

        Ok(ResetOutcome {
            identifier: identifier.to_string(),
            cleared,
        })
    }

    /// Whether the backing store answers
    pub async fn is_healthy(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "State store health check failed");
                false
            }
        }
    }

    /// Backend name of the state store
    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    fn report_failure(&self, operation: &str, spec: &RateLimitSpec, err: &ThrottleError) {
        match err {
            ThrottleError::InvalidSpec(_) => {}
            _ => {
                metrics::record_store_error(err.error_code());
                error!(
                    operation,
                    identifier = %spec.identifier,
                    algorithm = %spec.algorithm,
                    error = %err,
                    "Rate limit operation failed"
                );
            }
        }
    }
}
