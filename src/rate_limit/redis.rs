use super::lua_scripts::{SLIDING_WINDOW_SCRIPT, TOKEN_BUCKET_SCRIPT};
use super::store::{BucketParams, BucketSnapshot, StateStore, WindowParams, WindowSnapshot};
use crate::error::{Result, ThrottleError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis-backed shared state store
///
/// Each evaluation is a single EVALSHA (falling back to EVAL when the script
/// is not cached yet). The connection manager reconnects on its own; a call
/// that does not complete within `timeout` fails as `StoreUnavailable`.
pub struct RedisStore {
    /// Redis connection manager
    connection: ConnectionManager,
    token_bucket: Script,
    sliding_window: Script,
    timeout: Duration,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ThrottleError::Config(format!("Invalid Redis URL: {}", e)))?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                ThrottleError::StoreUnavailable(format!(
                    "Timed out connecting to Redis after {:?}",
                    timeout
                ))
            })??;

        info!("Connected to Redis");

        Ok(Self {
            connection,
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            sliding_window: Script::new(SLIDING_WINDOW_SCRIPT),
            timeout,
        })
    }
}

/// Run one Redis call under `timeout`
///
/// Expiry is reported as `StoreUnavailable`, never as a decision.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = redis::RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(operation, error = %e, "Redis error");
            Err(e.into())
        }
        Err(_) => {
            error!(operation, timeout = ?timeout, "Redis call timed out");
            Err(ThrottleError::StoreUnavailable(format!(
                "{} timed out after {:?}",
                operation, timeout
            )))
        }
    }
}

#[async_trait]
impl StateStore for RedisStore {
    async fn eval_token_bucket(&self, key: &str, params: &BucketParams) -> Result<BucketSnapshot> {
        let mut conn = self.connection.clone();

        let reply: Vec<String> = bounded(
            self.timeout,
            "token_bucket",
            self.token_bucket
                .key(key)
                .arg(params.limit)
                .arg(params.window_seconds)
                .arg(params.now_secs)
                .arg(if params.consume { "1" } else { "0" })
                .arg(params.ttl_secs)
                .invoke_async(&mut conn),
        )
        .await?;

        let snapshot = parse_bucket_reply(&reply)?;
        debug!(key, allowed = snapshot.allowed, tokens = snapshot.tokens, "Token bucket evaluated");
        Ok(snapshot)
    }

    async fn eval_sliding_window(
        &self,
        key: &str,
        params: &WindowParams,
    ) -> Result<WindowSnapshot> {
        let mut conn = self.connection.clone();

        let reply: Vec<String> = bounded(
            self.timeout,
            "sliding_window",
            self.sliding_window
                .key(key)
                .arg(params.limit)
                .arg(params.now_ms)
                .arg(params.window_start_ms())
                .arg(&params.member)
                .arg(if params.consume { "1" } else { "0" })
                .arg(params.ttl_secs)
                .invoke_async(&mut conn),
        )
        .await?;

        let snapshot = parse_window_reply(&reply)?;
        debug!(key, allowed = snapshot.allowed, count = snapshot.count, "Sliding window evaluated");
        Ok(snapshot)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let deleted: i64 = bounded(
            self.timeout,
            "delete",
            redis::cmd("DEL").arg(key).query_async(&mut conn),
        )
        .await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let pong: String =
            bounded(self.timeout, "ping", redis::cmd("PING").query_async(&mut conn)).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(ThrottleError::StoreProtocolError(format!(
                "unexpected PING reply '{}'",
                pong
            )))
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

fn protocol_error(what: &str, reply: &[String]) -> ThrottleError {
    ThrottleError::StoreProtocolError(format!("malformed {} reply: {:?}", what, reply))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

pub(crate) fn parse_bucket_reply(reply: &[String]) -> Result<BucketSnapshot> {
    let [allowed, tokens] = reply else {
        return Err(protocol_error("token bucket", reply));
    };

    let allowed = parse_flag(allowed).ok_or_else(|| protocol_error("token bucket", reply))?;
    let tokens = tokens
        .parse::<f64>()
        .ok()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .ok_or_else(|| protocol_error("token bucket", reply))?;

    Ok(BucketSnapshot { allowed, tokens })
}

pub(crate) fn parse_window_reply(reply: &[String]) -> Result<WindowSnapshot> {
    let [allowed, count, oldest] = reply else {
        return Err(protocol_error("sliding window", reply));
    };

    let allowed = parse_flag(allowed).ok_or_else(|| protocol_error("sliding window", reply))?;
    let count = count
        .parse::<u64>()
        .map_err(|_| protocol_error("sliding window", reply))?;
    let oldest_ms = if oldest.is_empty() {
        None
    } else {
        let score = oldest
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite())
            .ok_or_else(|| protocol_error("sliding window", reply))?;
        Some(score.round() as i64)
    };

    if count > 0 && oldest_ms.is_none() {
        return Err(protocol_error("sliding window", reply));
    }

    Ok(WindowSnapshot {
        allowed,
        count,
        oldest_ms,
    })
}
