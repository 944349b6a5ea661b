//! Tests for the async limiter, run on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tollgate_core::TokenUsage;
use tollgate_error::{RateLimitErrorKind, RemoteError, RemoteErrorKind};
use tollgate_rate_limit::{AsyncRateLimiter, BucketSpec, RetryPolicy};

fn plentiful_tokens() -> BucketSpec {
    BucketSpec::per_minute(1_000_000)
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_tasks_are_serialized() {
    // capacity 1, refilling one request every 2 seconds
    let limiter = Arc::new(AsyncRateLimiter::with_buckets(
        BucketSpec::new(1.0, 0.5),
        plentiful_tokens(),
    ));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _receipt = limiter.acquire(1).await.unwrap();
                Instant::now()
            })
        })
        .collect();

    let mut admitted = Vec::new();
    for task in tasks {
        admitted.push(task.await.unwrap());
    }
    admitted.sort();

    for pair in admitted.windows(2) {
        assert!(
            pair[1] - pair[0] >= Duration::from_millis(1_999),
            "admissions only {:?} apart",
            pair[1] - pair[0]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_token_bucket_delays_large_call() {
    // 600 tokens per minute: 10 per second
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::per_second(100.0),
        BucketSpec::per_minute(600),
    );
    let start = Instant::now();

    let _first = limiter.acquire(600).await.unwrap();
    let second = limiter.acquire(50).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    assert!(second.waited() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_leaves_balances_untouched() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(1.0, 0.01),
        BucketSpec::new(1_000.0, 0.0),
    );
    let mut first = limiter.acquire(100).await.unwrap();
    limiter.refund(&mut first, 100).unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let err = limiter.acquire_cancellable(500, &cancel).await.unwrap_err();
    assert_eq!(err.kind(), &RateLimitErrorKind::Cancelled);

    let snapshot = limiter.snapshot();
    assert_eq!(snapshot.tokens.available, 900.0);
    assert!(snapshot.requests.available < 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_acquire_reserves_nothing() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(1.0, 0.01),
        BucketSpec::new(1_000.0, 0.0),
    );
    let _held = limiter.acquire(0).await.unwrap();

    let timed_out = tokio::time::timeout(Duration::from_secs(1), limiter.acquire(250)).await;
    assert!(timed_out.is_err());
    assert_eq!(limiter.snapshot().tokens.available, 1_000.0);

    // the queue is free again once the dropped acquirer is gone
    let _next = tokio::time::timeout(Duration::from_secs(120), limiter.acquire(250))
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_try_acquire_never_waits() {
    let limiter = AsyncRateLimiter::new(1.0, 60_000);
    assert!(limiter.try_acquire(10).is_some());
    assert!(limiter.try_acquire(10).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_retry_delays_double() {
    let limiter = AsyncRateLimiter::new(100.0, 600_000);
    let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(32));
    let mut attempts = Vec::new();
    let start = Instant::now();

    let usage = limiter
        .execute(&policy, 100, || {
            attempts.push(start.elapsed());
            let n = attempts.len();
            async move {
                if n <= 3 {
                    Err(RemoteError::rate_limited(None))
                } else {
                    Ok(TokenUsage::new(40, 10))
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(usage.total_tokens(), 50);
    assert_eq!(attempts.len(), 4);
    let gaps: Vec<Duration> = attempts.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([1, 2, 4]) {
        assert!(*gap >= Duration::from_secs(expected), "gap {:?}", gap);
        assert!(*gap < Duration::from_secs(expected) + Duration::from_millis(50));
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_exhaustion_reports_attempts() {
    let limiter = AsyncRateLimiter::new(100.0, 600_000);
    let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(32));
    let mut calls = 0u32;
    let start = Instant::now();

    let err = limiter
        .execute(&policy, 100, || {
            calls += 1;
            async { Err::<TokenUsage, _>(RemoteError::rate_limited(None)) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 4);
    assert!(start.elapsed() >= Duration::from_secs(7));
    match err.as_rate_limit().map(|e| e.kind()) {
        Some(RateLimitErrorKind::Exhausted { attempts, last_delay }) => {
            assert_eq!(*attempts, 4);
            assert_eq!(*last_delay, Duration::from_secs(4));
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_hint_is_honored() {
    let limiter = AsyncRateLimiter::new(100.0, 600_000);
    let policy = RetryPolicy::new(1, Duration::from_secs(1), Duration::from_secs(32));
    let mut calls = 0u32;
    let start = Instant::now();

    limiter
        .execute(&policy, 10, || {
            calls += 1;
            let first = calls == 1;
            async move {
                if first {
                    Err(RemoteError::rate_limited(Some(Duration::from_secs(9))))
                } else {
                    Ok(TokenUsage::new(1, 1))
                }
            }
        })
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(9));
}

#[tokio::test(start_paused = true)]
async fn test_non_rate_limit_error_is_not_retried() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(10.0, 0.0),
        BucketSpec::new(1_000.0, 0.0),
    );
    let mut calls = 0u32;

    let err = limiter
        .execute(&RetryPolicy::default(), 300, || {
            calls += 1;
            async {
                Err::<TokenUsage, _>(RemoteError::new(RemoteErrorKind::Api {
                    status: 500,
                    message: "internal".to_string(),
                }))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(err.as_remote().is_some());
    assert_eq!(limiter.snapshot().tokens.available, 1_000.0);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_call_releases_reservation() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(10.0, 0.0),
        BucketSpec::new(1_000.0, 0.0),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        limiter.execute(&RetryPolicy::default(), 400, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(TokenUsage::new(400, 0))
        }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(limiter.snapshot().tokens.available, 1_000.0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_fixed_retries_and_keeps_charge() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(10.0, 0.0),
        BucketSpec::new(1_000.0, 0.0),
    );
    let mut calls = 0u32;
    let start = Instant::now();

    limiter
        .execute_fixed(&RetryPolicy::default(), 10, || {
            calls += 1;
            let first = calls == 1;
            async move {
                if first {
                    Err(RemoteError::rate_limited(None))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(calls, 2);
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(limiter.snapshot().tokens.available, 990.0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_deferred_settles_later() {
    let limiter = AsyncRateLimiter::with_buckets(
        BucketSpec::new(10.0, 0.0),
        BucketSpec::new(1_000.0, 0.0),
    );

    let (_, reservation) = limiter
        .execute_deferred(&RetryPolicy::default(), 300, || async {
            Ok::<_, RemoteError>(())
        })
        .await
        .unwrap();
    assert_eq!(limiter.snapshot().tokens.available, 700.0);

    reservation.settle(100).unwrap();
    assert_eq!(limiter.snapshot().tokens.available, 900.0);
}
