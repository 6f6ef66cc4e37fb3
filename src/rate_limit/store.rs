//! Shared state store contract.
//!
//! A store executes one algorithm's whole read-modify-write for a single key
//! as an indivisible step and reports the post-operation state. Operations on
//! different keys carry no ordering relative to each other.

use crate::error::Result;
use async_trait::async_trait;

/// Inputs for one atomic token bucket evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct BucketParams {
    /// Bucket capacity
    pub limit: u64,
    pub window_seconds: f64,
    /// Current time in fractional seconds since the epoch
    pub now_secs: f64,
    /// Take a token when one is available; `false` only observes
    pub consume: bool,
    /// Expiry applied when the bucket is written
    pub ttl_secs: u64,
}

impl BucketParams {
    /// Tokens added per second
    pub fn refill_rate(&self) -> f64 {
        self.limit as f64 / self.window_seconds
    }
}

/// Bucket state right after an evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// At least one whole token was available
    pub allowed: bool,
    /// Tokens left, after consumption when a token was taken
    pub tokens: f64,
}

/// Inputs for one atomic sliding window evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct WindowParams {
    pub limit: u64,
    pub window_seconds: f64,
    /// Current time in milliseconds since the epoch
    pub now_ms: i64,
    /// Unique log member recorded for this request
    pub member: String,
    /// Append `member` when under the limit; `false` only observes
    pub consume: bool,
    /// Expiry applied when the log is written
    pub ttl_secs: u64,
}

impl WindowParams {
    /// Window length in whole milliseconds, the resolution of log entries.
    /// Validated specs are at least 1 ms; fractional milliseconds round to nearest.
    pub fn window_ms(&self) -> i64 {
        (self.window_seconds * 1000.0).round() as i64
    }

    /// Entries strictly older than this are pruned
    pub fn window_start_ms(&self) -> i64 {
        self.now_ms - self.window_ms()
    }
}

/// Log state right after an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// The log had room for this request
    pub allowed: bool,
    /// Entries in the log after the operation
    pub count: u64,
    /// Timestamp of the oldest remaining entry
    pub oldest_ms: Option<i64>,
}

/// Key-addressable store offering single-key atomic execution and expiry.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Refill and optionally consume from the bucket stored at `key`
    async fn eval_token_bucket(&self, key: &str, params: &BucketParams) -> Result<BucketSnapshot>;

    /// Prune, count and optionally append to the log stored at `key`
    async fn eval_sliding_window(&self, key: &str, params: &WindowParams)
        -> Result<WindowSnapshot>;

    /// Remove the record at `key`, reporting whether one existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Verify the store is reachable
    async fn ping(&self) -> Result<()>;

    /// Short backend name used in logs and health output
    fn name(&self) -> &'static str;
}
