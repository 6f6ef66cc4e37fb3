use super::clock::Clock;
use super::store::{StateStore, WindowParams, WindowSnapshot};
use super::types::{Algorithm, RateLimitDecision, RateLimitKey, RateLimitSpec, RateLimitStatus};
use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// One logged request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at_ms: i64,
    pub member: String,
}

/// Request timestamps within the trailing window, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowLog {
    entries: VecDeque<LogEntry>,
}

impl WindowLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn oldest_ms(&self) -> Option<i64> {
        self.entries.front().map(|entry| entry.at_ms)
    }

    /// Drop entries strictly older than `window_start_ms`; the boundary stays counted
    pub fn prune(&mut self, window_start_ms: i64) {
        while self
            .entries
            .front()
            .is_some_and(|entry| entry.at_ms < window_start_ms)
        {
            self.entries.pop_front();
        }
    }

    /// Insert keeping timestamp order, even if a skewed clock sends an earlier one
    pub fn record(&mut self, at_ms: i64, member: String) {
        let position = self.entries.partition_point(|entry| entry.at_ms <= at_ms);
        self.entries.insert(position, LogEntry { at_ms, member });
    }

    /// One atomic step: prune, count, and append when asked and under the limit
    pub fn apply(&mut self, params: &WindowParams) -> WindowSnapshot {
        self.prune(params.window_start_ms());

        let allowed = (self.entries.len() as u64) < params.limit;
        if allowed && params.consume {
            self.record(params.now_ms, params.member.clone());
        }

        WindowSnapshot {
            allowed,
            count: self.entries.len() as u64,
            oldest_ms: self.oldest_ms(),
        }
    }
}

/// Exact-count limiter: no more than `limit` requests in the trailing window
pub struct SlidingWindowLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, key_prefix: String) -> Self {
        Self {
            store,
            clock,
            key_prefix,
        }
    }

    /// Record this request if the window has room
    pub async fn check(&self, spec: &RateLimitSpec) -> Result<RateLimitDecision> {
        let key = spec.key().to_store_key(&self.key_prefix);
        let params = self.params(spec, true);

        let snapshot = self.store.eval_sliding_window(&key, &params).await?;
        let decision = decide(&snapshot, spec, params.now_ms);

        debug!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            count = snapshot.count,
            "Sliding window check"
        );

        Ok(decision)
    }

    /// Prune and count without recording
    pub async fn status(&self, spec: &RateLimitSpec) -> Result<RateLimitStatus> {
        let key = spec.key().to_store_key(&self.key_prefix);
        let params = self.params(spec, false);

        let snapshot = self.store.eval_sliding_window(&key, &params).await?;

        Ok(RateLimitStatus::new(
            spec,
            spec.limit.saturating_sub(snapshot.count),
            snapshot.count,
            until_oldest_expires(&snapshot, spec, params.now_ms).unwrap_or(0.0),
        ))
    }

    /// Delete the whole log for `identifier`
    pub async fn reset(&self, identifier: &str) -> Result<bool> {
        let key = RateLimitKey::new(Algorithm::SlidingWindow, identifier.to_string())
            .to_store_key(&self.key_prefix);

        let deleted = self.store.delete(&key).await?;
        info!(identifier = %identifier, deleted, "Reset sliding window");
        Ok(deleted)
    }

    fn params(&self, spec: &RateLimitSpec, consume: bool) -> WindowParams {
        let now_ms = i64::try_from(self.clock.now_millis()).unwrap_or(i64::MAX);

        WindowParams {
            limit: spec.limit,
            window_seconds: spec.window_seconds,
            now_ms,
            member: format!("{}:{}", now_ms, Uuid::new_v4().simple()),
            consume,
            ttl_secs: spec.ttl_secs(),
        }
    }
}

/// Translate a post-operation log into a decision
pub(crate) fn decide(
    snapshot: &WindowSnapshot,
    spec: &RateLimitSpec,
    now_ms: i64,
) -> RateLimitDecision {
    let until_oldest = until_oldest_expires(snapshot, spec, now_ms);

    if snapshot.allowed {
        RateLimitDecision::allowed(
            spec.limit.saturating_sub(snapshot.count),
            until_oldest.unwrap_or(0.0),
        )
    } else {
        RateLimitDecision::denied(until_oldest.unwrap_or(spec.window_seconds))
    }
}

/// Seconds until the oldest logged entry leaves the window
fn until_oldest_expires(snapshot: &WindowSnapshot, spec: &RateLimitSpec, now_ms: i64) -> Option<f64> {
    snapshot.oldest_ms.map(|oldest| {
        let window_ms = spec.window_seconds * 1000.0;
        ((oldest as f64 + window_ms - now_ms as f64) / 1000.0).max(0.0)
    })
}
