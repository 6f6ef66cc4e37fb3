//! Rate limiting engine
//!
//! Two algorithms over a shared, atomic state store:
//!
//! - **Token Bucket**: capacity `limit`, continuous refill at `limit / window`
//!   per second; allows bursts up to capacity
//! - **Sliding Window Log**: exact count of accepted requests in the trailing
//!   window
//!
//! Every evaluation is one atomic read-modify-write against a [`StateStore`]:
//! a Lua script on Redis, or a per-key lock in [`MemoryStore`]. Instances that
//! share a store share quotas, and concurrent checks on one identifier can
//! never admit more than the quota allows.
//!
//! # Example
//!
//! ```rust,no_run
//! use throttle::rate_limit::{Algorithm, RateLimitSpec, RateLimiterService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = RateLimiterService::in_memory();
//!     let spec = RateLimitSpec::new("user_123", Algorithm::TokenBucket, 100, 60.0);
//!
//!     let decision = service.check(&spec).await.unwrap();
//!     println!("allowed: {}, remaining: {}", decision.allowed, decision.remaining);
//! }
//! ```

pub mod clock;
pub mod lua_scripts;
pub mod memory;
pub mod redis;
pub mod service;
pub mod sliding_window;
pub mod store;
pub mod token_bucket;
pub mod types;

// Re-export commonly used types
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
pub use self::service::RateLimiterService;
pub use self::store::StateStore;
pub use self::types::{
    Algorithm, RateLimitDecision, RateLimitKey, RateLimitSpec, RateLimitStatus, ResetOutcome,
};
