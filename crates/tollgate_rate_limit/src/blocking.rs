//! Blocking admission controller.
//!
//! Callers on any number of threads may share one `RateLimiter` (typically behind an
//! `Arc`). Acquirers queue on an admission lock and are admitted one at a time; the
//! thread at the front sleeps for its own computed wait while holding only its place
//! in the queue, so refunds and snapshots from other threads are never blocked by a
//! sleeping acquirer.

use crate::engine::{Admission, Demand, LimiterSnapshot, SharedBuckets};
use crate::{BucketSpec, LimiterConfig, Reservation, ReservationReceipt};
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tollgate_error::RateLimitResult;
use tracing::{debug, instrument};

fn system_clock() -> Instant {
    Instant::now()
}

/// Thread-safe dual token-bucket limiter that blocks the calling thread.
///
/// Enforces two independent limits:
/// - **requests per second**, with a burst capacity equal to the rate
/// - **tokens per minute**, with the whole minute available as burst
///
/// # Example
///
/// ```
/// use tollgate_rate_limit::RateLimiter;
///
/// let limiter = RateLimiter::new(5.0, 60_000);
///
/// let mut receipt = limiter.acquire(1_200).unwrap();
/// // ... make the remote call, learn it used 700 tokens ...
/// let credited = limiter.refund(&mut receipt, 700).unwrap();
/// assert!(credited <= 500.0);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    buckets: SharedBuckets,
    queue: Mutex<()>,
}

impl RateLimiter {
    /// Create a limiter from a request rate and a per-minute token budget.
    pub fn new(requests_per_second: f64, tokens_per_minute: u64) -> Self {
        Self::with_buckets(
            BucketSpec::per_second(requests_per_second),
            BucketSpec::per_minute(tokens_per_minute),
        )
    }

    /// Create a limiter with explicit bucket shapes.
    pub fn with_buckets(requests: BucketSpec, tokens: BucketSpec) -> Self {
        Self {
            buckets: SharedBuckets::new(requests, tokens, system_clock),
            queue: Mutex::new(()),
        }
    }

    /// Create a limiter from configured rates.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::with_buckets(config.request_bucket(), config.token_bucket())
    }

    /// Acquire one request unit and `token_cost` tokens, blocking until both
    /// buckets allow it.
    ///
    /// # Errors
    ///
    /// Fails only when a bucket with a zero refill rate can never cover the cost.
    pub fn acquire(&self, token_cost: u64) -> RateLimitResult<ReservationReceipt> {
        self.acquire_units(1, token_cost)
    }

    /// Acquire explicit request and token costs, blocking until both buckets allow it.
    ///
    /// The wait is the larger of the two per-bucket waits. Costs above a bucket's
    /// capacity are allowed and simply wait longer.
    #[instrument(skip(self), fields(limiter = "blocking"))]
    pub fn acquire_units(
        &self,
        request_cost: u32,
        token_cost: u64,
    ) -> RateLimitResult<ReservationReceipt> {
        let _turn = self.queue.lock();
        let started = Instant::now();
        let mut demand = Demand::new(request_cost, token_cost);

        loop {
            match self.buckets.admit(&mut demand)? {
                Admission::Granted(receipt) => {
                    let waited = started.elapsed();
                    debug!(waited_ms = waited.as_millis() as u64, "Admitted");
                    return Ok(receipt.with_waited(waited));
                }
                Admission::Wait(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Waiting for refill");
                    std::thread::sleep(wait);
                }
            }
        }
    }

    /// Acquire like [`acquire`](Self::acquire) and wrap the receipt in a
    /// [`Reservation`] that releases itself when dropped unsettled.
    pub fn reserve(&self, token_cost: u64) -> RateLimitResult<Reservation<'_>> {
        let receipt = self.acquire(token_cost)?;
        Ok(Reservation::new(&self.buckets, receipt))
    }

    /// Acquire only if no wait is needed and no other caller is queued.
    pub fn try_acquire(&self, token_cost: u64) -> Option<ReservationReceipt> {
        let _turn = self.queue.try_lock()?;
        match self.buckets.admit(&mut Demand::new(1, token_cost)) {
            Ok(Admission::Granted(receipt)) => Some(receipt),
            Ok(Admission::Wait(_)) | Err(_) => None,
        }
    }

    /// How long an acquisition of these costs would wait right now.
    pub fn wait_time(&self, request_cost: u32, token_cost: u64) -> RateLimitResult<Duration> {
        self.buckets.wait_time(&Demand::new(request_cost, token_cost))
    }

    /// Settle a reservation, crediting `reserved - actual_tokens` back when positive.
    ///
    /// Returns the number of tokens credited (capped at the bucket capacity).
    ///
    /// # Errors
    ///
    /// Rejects receipts that were already settled or were issued by another limiter.
    pub fn refund(
        &self,
        receipt: &mut ReservationReceipt,
        actual_tokens: u64,
    ) -> RateLimitResult<f64> {
        self.buckets.refund(receipt, actual_tokens)
    }

    /// Settle a reservation with zero usage, returning the whole estimate.
    pub fn release(&self, receipt: &mut ReservationReceipt) -> RateLimitResult<f64> {
        self.buckets.refund(receipt, 0)
    }

    /// Current balances with refill applied.
    pub fn snapshot(&self) -> LimiterSnapshot {
        self.buckets.snapshot()
    }
}
