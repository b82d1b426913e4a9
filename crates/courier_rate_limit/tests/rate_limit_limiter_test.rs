//! Tests for the dual-scope rate limiter.

use courier_rate_limit::{BucketConfig, RateLimitConfig, RateLimiter};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn per_key_limiter(rps: f64, burst: u32) -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        global: None,
        per_key: Some(BucketConfig::new(rps, burst)),
        idle_eviction_secs: None,
    })
    .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn test_admissions_never_exceed_burst_plus_refill() {
    let limiter = per_key_limiter(4.0, 2);
    let start = Instant::now();
    let mut admitted = Vec::new();

    // Hammer the bucket every 10ms for three seconds
    for _ in 0..300 {
        if limiter.allow("chat") {
            admitted.push(start.elapsed());
        }
        tokio::time::advance(Duration::from_millis(10)).await;
    }

    for (index, at) in admitted.iter().enumerate() {
        let bound = 2.0 + 4.0 * at.as_secs_f64() + 1e-6;
        assert!(
            (index + 1) as f64 <= bound,
            "{} admissions by {:?} exceeds bound {}",
            index + 1,
            at,
            bound
        );
    }
    // Burst of two plus roughly four per second
    assert!(admitted.len() >= 12, "only {} admitted", admitted.len());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_all_admitted() {
    let limiter = Arc::new(per_key_limiter(4.0, 2));
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let waiters = (0..10).map(|_| {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        async move {
            limiter.wait(&cancel, "chat").await.map(|()| start.elapsed())
        }
    });
    let results = join_all(waiters).await;

    let mut times: Vec<Duration> = results
        .into_iter()
        .map(|result| result.expect("every waiter is admitted"))
        .collect();
    times.sort();

    // Eight waiters beyond the burst need at least two seconds of refill
    assert!(times[9] >= Duration::from_millis(1990));
    for (index, at) in times.iter().enumerate() {
        assert!((index + 1) as f64 <= 2.0 + 4.0 * at.as_secs_f64() + 1e-6);
    }
}

#[test]
fn test_parallel_allow_never_over_admits() {
    // Refill is negligible for the length of the test
    let limiter = RateLimiter::new(RateLimitConfig {
        global: Some(BucketConfig::new(0.001, 40)),
        per_key: Some(BucketConfig::new(0.001, 10)),
        idle_eviction_secs: None,
    })
    .expect("valid config");

    let counts: Vec<(usize, usize)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|thread| {
                let limiter = &limiter;
                scope.spawn(move || {
                    let key = format!("chat-{}", thread % 8);
                    let admitted = (0..10).filter(|_| limiter.allow(&key)).count();
                    (thread % 8, admitted)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect()
    });

    let total: usize = counts.iter().map(|(_, admitted)| admitted).sum();
    assert_eq!(total, 40);
    for key in 0..8 {
        let per_key: usize = counts
            .iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, admitted)| admitted)
            .sum();
        assert!(per_key <= 10, "key {} admitted {}", key, per_key);
    }
    assert_eq!(limiter.key_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_wait_honours_cancellation() {
    let limiter = Arc::new(per_key_limiter(0.001, 1));
    assert!(limiter.allow("chat"));

    let cancel = CancellationToken::new();
    let handle = {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.wait(&cancel, "chat").await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    cancel.cancel();
    let result = handle.await.expect("task completes");
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_token_rejects_immediately() {
    let limiter = per_key_limiter(1.0, 5);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(limiter.wait(&cancel, "chat").await.is_err());
    // Nothing was debited
    for _ in 0..5 {
        assert!(limiter.allow("chat"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_global_bucket_shared_across_keys() {
    let limiter = RateLimiter::new(RateLimitConfig {
        global: Some(BucketConfig::new(1.0, 3)),
        per_key: Some(BucketConfig::new(1.0, 3)),
        idle_eviction_secs: None,
    })
    .expect("valid config");

    assert!(limiter.allow("a"));
    assert!(limiter.allow("b"));
    assert!(limiter.allow("c"));
    assert!(!limiter.allow("d"));
    assert_eq!(limiter.key_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_idle_buckets_swept_on_creation() {
    let limiter = RateLimiter::new(RateLimitConfig {
        global: None,
        per_key: Some(BucketConfig::new(1.0, 1)),
        idle_eviction_secs: Some(1),
    })
    .expect("valid config");

    assert!(limiter.allow("a"));
    assert_eq!(limiter.key_count(), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(limiter.allow("b"));
    assert_eq!(limiter.key_count(), 1);

    // A recreated bucket starts full, just like the evicted one would have been
    assert!(limiter.allow("a"));
}
