use super::clock::Clock;
use super::sliding_window::WindowLog;
use super::store::{BucketParams, BucketSnapshot, StateStore, WindowParams, WindowSnapshot};
use super::token_bucket::BucketState;
use crate::error::{Result, ThrottleError};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
enum Record {
    Bucket(BucketState),
    Log(WindowLog),
}

#[derive(Debug, Clone)]
struct Slot {
    record: Record,
    expires_at_ms: i64,
}

fn expiry(now_ms: i64, ttl_secs: u64) -> i64 {
    let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    now_ms.saturating_add(ttl_ms)
}

impl Slot {
    fn new(record: Record, now_ms: i64, ttl_secs: u64) -> Self {
        Self {
            record,
            expires_at_ms: expiry(now_ms, ttl_secs),
        }
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms <= now_ms
    }
}

/// In-process store for a single instance.
///
/// Each key lives in one shard of a concurrent map; an evaluation holds that
/// shard's write lock for its whole read-modify-write, so operations on the
/// same key are serialized while keys in other shards proceed in parallel.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Number of stored records, expired ones included until purged
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Drop every record whose TTL has elapsed
    pub fn purge_expired(&self, now_ms: i64) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now_ms));
        let purged = before.saturating_sub(self.slots.len());
        if purged > 0 {
            debug!(purged, "Purged expired rate limit records");
        }
        purged
    }

    /// Periodically purge expired records in the background
    pub fn spawn_sweeper(self: &Arc<Self>, clock: Arc<dyn Clock>, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let now_ms = i64::try_from(clock.now_millis()).unwrap_or(i64::MAX);
                store.purge_expired(now_ms);
            }
        })
    }
}

fn wrong_type(key: &str, expected: &str) -> ThrottleError {
    ThrottleError::StoreProtocolError(format!(
        "record at '{}' does not hold a {}",
        key, expected
    ))
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn eval_token_bucket(&self, key: &str, params: &BucketParams) -> Result<BucketSnapshot> {
        let now_ms = (params.now_secs * 1000.0) as i64;

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_expired(now_ms) {
                    None
                } else {
                    match &occupied.get().record {
                        Record::Bucket(state) => Some(*state),
                        Record::Log(_) => return Err(wrong_type(key, "token bucket")),
                    }
                };

                let (next, snapshot) = BucketState::advance(current, params);
                if params.consume {
                    occupied.insert(Slot::new(Record::Bucket(next), now_ms, params.ttl_secs));
                } else if current.is_none() {
                    occupied.remove();
                }
                Ok(snapshot)
            }
            Entry::Vacant(vacant) => {
                let (next, snapshot) = BucketState::advance(None, params);
                if params.consume {
                    vacant.insert(Slot::new(Record::Bucket(next), now_ms, params.ttl_secs));
                }
                Ok(snapshot)
            }
        }
    }

    async fn eval_sliding_window(
        &self,
        key: &str,
        params: &WindowParams,
    ) -> Result<WindowSnapshot> {
        let now_ms = params.now_ms;

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                if slot.is_expired(now_ms) {
                    slot.record = Record::Log(WindowLog::new());
                }

                let snapshot = match &mut slot.record {
                    Record::Log(log) => log.apply(params),
                    Record::Bucket(_) => return Err(wrong_type(key, "sliding window log")),
                };

                if params.consume && snapshot.count > 0 {
                    slot.expires_at_ms = expiry(now_ms, params.ttl_secs);
                }
                if snapshot.count == 0 {
                    occupied.remove();
                }
                Ok(snapshot)
            }
            Entry::Vacant(vacant) => {
                let mut log = WindowLog::new();
                let snapshot = log.apply(params);
                if params.consume && !log.is_empty() {
                    vacant.insert(Slot::new(Record::Log(log), now_ms, params.ttl_secs));
                }
                Ok(snapshot)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.slots.remove(key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
