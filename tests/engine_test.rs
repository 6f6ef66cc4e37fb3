use std::sync::Arc;
use std::time::Duration;
use throttle::error::ThrottleError;
use throttle::rate_limit::{
    Algorithm, ManualClock, MemoryStore, RateLimitSpec, RateLimiterService, SystemClock,
};

const START_MS: u64 = 1_700_000_000_000;

fn service_with_clock() -> (RateLimiterService, ManualClock) {
    let clock = ManualClock::new(START_MS);
    let service = RateLimiterService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(clock.clone()),
        "throttle",
    );
    (service, clock)
}

#[tokio::test]
async fn test_token_bucket_burst_then_deny() {
    let (service, _clock) = service_with_clock();
    let spec = RateLimitSpec::new("burst", Algorithm::TokenBucket, 5, 60.0);

    for i in 0..5 {
        let decision = service.check(&spec).await.unwrap();
        assert!(decision.allowed, "request {} should be allowed", i + 1);
        assert_eq!(decision.remaining, 4 - i);
        assert!(decision.retry_after.is_none());
    }

    let denied = service.check(&spec).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after, Some(12.0));
    assert_eq!(denied.reset_in_seconds, 12.0);
}

#[tokio::test]
async fn test_token_bucket_refill() {
    let (service, clock) = service_with_clock();
    let spec = RateLimitSpec::new("refill", Algorithm::TokenBucket, 10, 10.0);

    for _ in 0..10 {
        assert!(service.check(&spec).await.unwrap().allowed);
    }
    assert!(!service.check(&spec).await.unwrap().allowed);

    clock.advance(Duration::from_secs(3));

    let status = service.status(&spec).await.unwrap();
    assert_eq!(status.remaining, 3);
    assert_eq!(status.requests_used, 7);

    for _ in 0..3 {
        assert!(service.check(&spec).await.unwrap().allowed);
    }
    assert!(!service.check(&spec).await.unwrap().allowed);
}

#[tokio::test]
async fn test_token_bucket_long_idle_clamps_at_capacity() {
    let (service, clock) = service_with_clock();
    let spec = RateLimitSpec::new("idle", Algorithm::TokenBucket, 4, 1.0);

    assert!(service.check(&spec).await.unwrap().allowed);
    clock.advance(Duration::from_secs(60 * 60 * 24 * 365));

    let status = service.status(&spec).await.unwrap();
    assert_eq!(status.remaining, 4);
    assert_eq!(status.reset_in_seconds, 0.0);
}

#[tokio::test]
async fn test_sliding_window_exact_count() {
    let (service, clock) = service_with_clock();
    let spec = RateLimitSpec::new("exact", Algorithm::SlidingWindow, 3, 60.0);

    assert!(service.check(&spec).await.unwrap().allowed);
    assert!(service.check(&spec).await.unwrap().allowed);
    clock.advance(Duration::from_secs(30));
    assert!(service.check(&spec).await.unwrap().allowed);

    let denied = service.check(&spec).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after, Some(30.0));

    // 61s after the first two requests only the third is still in the window
    clock.advance(Duration::from_secs(31));
    let decision = service.check(&spec).await.unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 1);

    let status = service.status(&spec).await.unwrap();
    assert_eq!(status.requests_used, 2);
}

#[tokio::test]
async fn test_reset_restores_full_quota() {
    for algorithm in Algorithm::ALL {
        let (service, _clock) = service_with_clock();
        let spec = RateLimitSpec::new("exhausted", algorithm, 2, 60.0);
        let fresh = RateLimitSpec::new("fresh", algorithm, 2, 60.0);

        service.check(&spec).await.unwrap();
        service.check(&spec).await.unwrap();
        assert!(!service.check(&spec).await.unwrap().allowed);

        let outcome = service.reset("exhausted", Some(algorithm)).await.unwrap();
        assert_eq!(outcome.cleared, 1);

        let after_reset = service.check(&spec).await.unwrap();
        let brand_new = service.check(&fresh).await.unwrap();
        assert_eq!(after_reset, brand_new, "{} reset differs from new", algorithm);
    }
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let (service, _clock) = service_with_clock();

    let first = service.reset("ghost", None).await.unwrap();
    let second = service.reset("ghost", None).await.unwrap();
    assert_eq!(first.cleared, 0);
    assert_eq!(second.cleared, 0);
}

#[tokio::test]
async fn test_status_is_non_mutating() {
    for algorithm in Algorithm::ALL {
        let (observed, observed_clock) = service_with_clock();
        let (quiet, quiet_clock) = service_with_clock();
        let spec = RateLimitSpec::new("watched", algorithm, 3, 10.0);

        for step in 0..8 {
            let a = observed.check(&spec).await.unwrap();
            for _ in 0..5 {
                observed.status(&spec).await.unwrap();
            }
            let b = quiet.check(&spec).await.unwrap();
            assert_eq!(a, b, "{} diverged at step {}", algorithm, step);

            observed_clock.advance(Duration::from_millis(1500));
            quiet_clock.advance(Duration::from_millis(1500));
        }
    }
}

#[tokio::test]
async fn test_invalid_specs_are_rejected() {
    let (service, _clock) = service_with_clock();

    let cases = [
        RateLimitSpec::new("", Algorithm::TokenBucket, 10, 60.0),
        RateLimitSpec::new("user", Algorithm::TokenBucket, 0, 60.0),
        RateLimitSpec::new("user", Algorithm::SlidingWindow, 10, 0.0),
        RateLimitSpec::new("user", Algorithm::SlidingWindow, 10, f64::NAN),
        RateLimitSpec::new("x".repeat(257), Algorithm::TokenBucket, 10, 60.0),
    ];

    for spec in &cases {
        assert!(matches!(
            service.check(spec).await,
            Err(ThrottleError::InvalidSpec(_))
        ));
    }
}

async fn concurrent_allowed(algorithm: Algorithm, callers: usize, capacity: u64) -> usize {
    let service = Arc::new(RateLimiterService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        "throttle",
    ));
    let spec = RateLimitSpec::new(
        format!("race-{}", rand::random::<u32>()),
        algorithm,
        capacity,
        3600.0,
    );

    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let service = Arc::clone(&service);
            let spec = spec.clone();
            tokio::spawn(async move { service.check(&spec).await.unwrap().allowed })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .filter(|allowed| *allowed)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_token_bucket_never_overshoots() {
    assert_eq!(concurrent_allowed(Algorithm::TokenBucket, 200, 25).await, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_sliding_window_never_overshoots() {
    assert_eq!(concurrent_allowed(Algorithm::SlidingWindow, 200, 25).await, 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_identifiers_do_not_interfere() {
    let service = Arc::new(RateLimiterService::in_memory());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                let spec =
                    RateLimitSpec::new(format!("tenant-{}", i), Algorithm::SlidingWindow, 5, 60.0);
                let mut allowed = 0;
                for _ in 0..8 {
                    if service.check(&spec).await.unwrap().allowed {
                        allowed += 1;
                    }
                }
                allowed
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        assert_eq!(result.unwrap(), 5);
    }
}
