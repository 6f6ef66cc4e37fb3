use super::clock::Clock;
use super::store::{BucketParams, BucketSnapshot, StateStore};
use super::types::{Algorithm, RateLimitDecision, RateLimitKey, RateLimitSpec, RateLimitStatus};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted bucket: a fractional token count and the instant it was last refilled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub tokens: f64,
    pub last_refill: f64,
}

impl BucketState {
    /// A bucket observed for the first time starts full
    pub fn full(limit: u64, now_secs: f64) -> Self {
        Self {
            tokens: limit as f64,
            last_refill: now_secs,
        }
    }

    /// Add the tokens accrued since `last_refill`, clamped to `[0, limit]`.
    ///
    /// A clock that moved backwards refills nothing and keeps the later
    /// `last_refill`, so skew between instances never mints extra tokens.
    pub fn refilled(self, params: &BucketParams) -> Self {
        let limit = params.limit as f64;
        let elapsed = (params.now_secs - self.last_refill).max(0.0);
        let tokens = (self.tokens + elapsed * params.refill_rate()).clamp(0.0, limit);

        Self {
            tokens,
            last_refill: self.last_refill.max(params.now_secs),
        }
    }

    /// One atomic step: lazily create, refill, and consume when asked and possible
    pub fn advance(current: Option<Self>, params: &BucketParams) -> (Self, BucketSnapshot) {
        let mut state = current
            .unwrap_or_else(|| Self::full(params.limit, params.now_secs))
            .refilled(params);

        let allowed = state.tokens >= 1.0;
        if allowed && params.consume {
            state.tokens = (state.tokens - 1.0).max(0.0);
        }

        (
            state,
            BucketSnapshot {
                allowed,
                tokens: state.tokens,
            },
        )
    }
}

/// Burst-tolerant limiter whose tokens refill continuously at `limit / window`
pub struct TokenBucketLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl TokenBucketLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, key_prefix: String) -> Self {
        Self {
            store,
            clock,
            key_prefix,
        }
    }

    /// Consume one token if available
    pub async fn check(&self, spec: &RateLimitSpec) -> Result<RateLimitDecision> {
        let key = spec.key().to_store_key(&self.key_prefix);
        let params = self.params(spec, true);

        let snapshot = self.store.eval_token_bucket(&key, &params).await?;
        let decision = decide(&snapshot, spec);

        debug!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            tokens = snapshot.tokens,
            "Token bucket check"
        );

        Ok(decision)
    }

    /// Refill without consuming
    pub async fn status(&self, spec: &RateLimitSpec) -> Result<RateLimitStatus> {
        let key = spec.key().to_store_key(&self.key_prefix);
        let params = self.params(spec, false);

        let snapshot = self.store.eval_token_bucket(&key, &params).await?;
        let remaining = snapshot.tokens.floor() as u64;

        Ok(RateLimitStatus::new(
            spec,
            remaining,
            spec.limit.saturating_sub(remaining),
            time_until_full(snapshot.tokens, spec),
        ))
    }

    /// Delete the stored bucket; the next check sees a full one
    pub async fn reset(&self, identifier: &str) -> Result<bool> {
        let key = RateLimitKey::new(Algorithm::TokenBucket, identifier.to_string())
            .to_store_key(&self.key_prefix);

        let deleted = self.store.delete(&key).await?;
        info!(identifier = %identifier, deleted, "Reset token bucket");
        Ok(deleted)
    }

    fn params(&self, spec: &RateLimitSpec, consume: bool) -> BucketParams {
        BucketParams {
            limit: spec.limit,
            window_seconds: spec.window_seconds,
            now_secs: self.clock.now_millis() as f64 / 1000.0,
            consume,
            ttl_secs: spec.ttl_secs(),
        }
    }
}

/// Translate a post-operation bucket into a decision
pub(crate) fn decide(snapshot: &BucketSnapshot, spec: &RateLimitSpec) -> RateLimitDecision {
    if snapshot.allowed {
        RateLimitDecision::allowed(
            snapshot.tokens.floor() as u64,
            time_until_full(snapshot.tokens, spec),
        )
    } else {
        let per_token = spec.window_seconds / spec.limit as f64;
        RateLimitDecision::denied((1.0 - snapshot.tokens).max(0.0) * per_token)
    }
}

fn time_until_full(tokens: f64, spec: &RateLimitSpec) -> f64 {
    let missing = (spec.limit as f64 - tokens).max(0.0);
    missing * spec.window_seconds / spec.limit as f64
}
