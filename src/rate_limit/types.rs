use crate::error::{Result, ThrottleError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest quota accepted for a single identifier
pub const MAX_LIMIT: u64 = 100_000;
/// Shortest window accepted; sliding window logs have millisecond resolution
pub const MIN_WINDOW_SECONDS: f64 = 0.001;
/// Longest window accepted (one day)
pub const MAX_WINDOW_SECONDS: f64 = 86_400.0;
/// Longest identifier accepted, in bytes
pub const MAX_IDENTIFIER_LEN: usize = 256;

/// Rate limiting algorithm
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuously refilling bucket, tolerates bursts up to the limit
    #[default]
    TokenBucket,
    /// Exact request log over the trailing window
    SlidingWindow,
}

impl Algorithm {
    pub const ALL: [Algorithm; 2] = [Algorithm::TokenBucket, Algorithm::SlidingWindow];

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::TokenBucket => "token_bucket",
            Algorithm::SlidingWindow => "sliding_window",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ThrottleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "token_bucket" => Ok(Algorithm::TokenBucket),
            "sliding_window" => Ok(Algorithm::SlidingWindow),
            other => Err(ThrottleError::InvalidSpec(format!(
                "unknown algorithm '{}'",
                other
            ))),
        }
    }
}

/// Which quota record to operate on, and its policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSpec {
    /// Caller-supplied key the quota is tracked per
    pub identifier: String,
    /// Algorithm backing this quota
    pub algorithm: Algorithm,
    /// Maximum number of requests per window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: f64,
}

impl RateLimitSpec {
    pub fn new(
        identifier: impl Into<String>,
        algorithm: Algorithm,
        limit: u64,
        window_seconds: f64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            algorithm,
            limit,
            window_seconds,
        }
    }

    /// Reject specs that must never reach the store
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.identifier)?;

        if self.limit == 0 {
            return Err(ThrottleError::InvalidSpec(
                "limit must be at least 1".to_string(),
            ));
        }
        if self.limit > MAX_LIMIT {
            return Err(ThrottleError::InvalidSpec(format!(
                "limit must not exceed {}",
                MAX_LIMIT
            )));
        }
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(ThrottleError::InvalidSpec(
                "window_seconds must be a positive number".to_string(),
            ));
        }
        if self.window_seconds < MIN_WINDOW_SECONDS {
            return Err(ThrottleError::InvalidSpec(format!(
                "window_seconds must be at least {}",
                MIN_WINDOW_SECONDS
            )));
        }
        if self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(ThrottleError::InvalidSpec(format!(
                "window_seconds must not exceed {}",
                MAX_WINDOW_SECONDS
            )));
        }

        Ok(())
    }

    /// Seconds the persisted record should outlive its last update
    pub fn ttl_secs(&self) -> u64 {
        ((self.window_seconds * 2.0).ceil() as u64).max(1)
    }

    pub fn key(&self) -> RateLimitKey {
        RateLimitKey::new(self.algorithm, self.identifier.clone())
    }
}

pub(crate) fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        return Err(ThrottleError::InvalidSpec(
            "identifier must not be empty".to_string(),
        ));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(ThrottleError::InvalidSpec(format!(
            "identifier must not exceed {} bytes",
            MAX_IDENTIFIER_LEN
        )));
    }
    Ok(())
}

/// Outcome of a `check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Whole requests still available
    pub remaining: u64,
    /// Seconds until the quota is fully restored
    pub reset_in_seconds: f64,
    /// Seconds to wait before retrying, only set on denial
    pub retry_after: Option<f64>,
}

impl RateLimitDecision {
    /// Create an allowed decision
    pub fn allowed(remaining: u64, reset_in_seconds: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            reset_in_seconds: round_millis(reset_in_seconds),
            retry_after: None,
        }
    }

    /// Create a denied decision
    pub fn denied(retry_after: f64) -> Self {
        let retry_after = round_millis(retry_after);
        Self {
            allowed: false,
            remaining: 0,
            reset_in_seconds: retry_after,
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only view of a quota, as returned by `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub identifier: String,
    pub requests_used: u64,
    pub remaining: u64,
    pub limit: u64,
    pub window_seconds: f64,
    pub algorithm: Algorithm,
    pub reset_in_seconds: f64,
}

impl RateLimitStatus {
    pub fn new(spec: &RateLimitSpec, remaining: u64, requests_used: u64, reset_in: f64) -> Self {
        Self {
            identifier: spec.identifier.clone(),
            requests_used,
            remaining,
            limit: spec.limit,
            window_seconds: spec.window_seconds,
            algorithm: spec.algorithm,
            reset_in_seconds: round_millis(reset_in),
        }
    }
}

/// Result of a `reset`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub identifier: String,
    /// Number of stored records that existed and were removed
    pub cleared: u32,
}

/// Rate limit key components
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub algorithm: Algorithm,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(algorithm: Algorithm, identifier: String) -> Self {
        Self {
            algorithm,
            identifier,
        }
    }

    /// Convert to a store key under the given namespace prefix
    pub fn to_store_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.algorithm.as_str(), self.identifier)
    }
}

/// Seconds rounded to millisecond precision, never negative
pub(crate) fn round_millis(seconds: f64) -> f64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0.0;
    }
    (seconds * 1000.0).round() / 1000.0
}
