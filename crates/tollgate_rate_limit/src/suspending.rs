//! Async admission controller.
//!
//! Same bucket rules as the blocking limiter, but a wait suspends the task instead
//! of stalling the thread. Acquisitions are serialized through a FIFO
//! `tokio::sync::Mutex`: tasks that call `acquire` at the same moment queue up, and
//! each computes its wait from the bucket state it finds when it reaches the front.
//! Dispatches therefore never overlap, even when every task was spawned at once.
//!
//! Dropping an `acquire` future (or cancelling it through a `CancellationToken`)
//! before it completes never reserves anything: the deduction happens synchronously
//! after the last suspension point.

use crate::engine::{Admission, Demand, LimiterSnapshot, SharedBuckets};
use crate::{BucketSpec, LimiterConfig, Reservation, ReservationReceipt};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tollgate_error::{RateLimitError, RateLimitErrorKind, RateLimitResult};
use tracing::{debug, instrument};

/// Reads tokio's clock so paused-time tests and real runtimes agree with `sleep`.
fn tokio_clock() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Dual token-bucket limiter for async tasks.
///
/// # Example
///
/// ```
/// use tollgate_rate_limit::AsyncRateLimiter;
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = AsyncRateLimiter::new(5.0, 60_000);
///
/// let mut receipt = limiter.acquire(1_200).await.unwrap();
/// limiter.refund(&mut receipt, 700).unwrap();
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncRateLimiter {
    buckets: SharedBuckets,
    queue: Mutex<()>,
}

impl AsyncRateLimiter {
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
            buckets: SharedBuckets::new(requests, tokens, tokio_clock),
            queue: Mutex::new(()),
        }
    }

    /// Create a limiter from configured rates.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::with_buckets(config.request_bucket(), config.token_bucket())
    }

    /// Acquire one request unit and `token_cost` tokens, suspending until both
    /// buckets allow it.
    ///
    /// # Errors
    ///
    /// Fails only when a bucket with a zero refill rate can never cover the cost.
    pub async fn acquire(&self, token_cost: u64) -> RateLimitResult<ReservationReceipt> {
        self.acquire_units(1, token_cost).await
    }

    /// Acquire explicit request and token costs, suspending until both buckets
    /// allow it.
    #[instrument(skip(self), fields(limiter = "async"))]
    pub async fn acquire_units(
        &self,
        request_cost: u32,
        token_cost: u64,
    ) -> RateLimitResult<ReservationReceipt> {
        let _turn = self.queue.lock().await;
        let started = tokio::time::Instant::now();
        let mut demand = Demand::new(request_cost, token_cost);

        loop {
            match self.buckets.admit(&mut demand)? {
                Admission::Granted(receipt) => {
                    let waited = started.elapsed();
                    debug!(waited_ms = waited.as_millis() as u64, "Admitted");
                    return Ok(receipt.with_waited(waited));
                }
                Admission::Wait(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "Suspending for refill");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Acquire like [`acquire`](Self::acquire), giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitErrorKind::Cancelled`] if the token is cancelled before
    /// admission. Bucket balances are left exactly as they were.
    pub async fn acquire_cancellable(
        &self,
        token_cost: u64,
        cancel: &CancellationToken,
    ) -> RateLimitResult<ReservationReceipt> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Acquisition cancelled");
                Err(RateLimitError::new(RateLimitErrorKind::Cancelled))
            }
            result = self.acquire(token_cost) => result,
        }
    }

    /// Acquire like [`acquire`](Self::acquire) and wrap the receipt in a
    /// [`Reservation`] that releases itself when dropped unsettled.
    pub async fn reserve(&self, token_cost: u64) -> RateLimitResult<Reservation<'_>> {
        let receipt = self.acquire(token_cost).await?;
        Ok(Reservation::new(&self.buckets, receipt))
    }

    /// Acquire only if no wait is needed and no other task is queued.
    pub fn try_acquire(&self, token_cost: u64) -> Option<ReservationReceipt> {
        let _turn = self.queue.try_lock().ok()?;
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
    /// Settlement never waits, so it is a plain function usable from any context.
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
