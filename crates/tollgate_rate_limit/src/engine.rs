//! Dual-bucket admission engine shared by the blocking and async limiters.
//!
//! The engine never waits. It answers "admit now" or "wait this long", and the
//! facades decide how to wait (thread sleep or task suspension). Keeping every
//! balance computation here means both execution models apply identical rules.

use crate::bucket::{Bucket, BucketSnapshot, BucketSpec};
use crate::ReservationReceipt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tollgate_error::{RateLimitError, RateLimitErrorKind, RateLimitResult};
use tracing::{debug, trace};

static NEXT_LIMITER_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic time source of a facade.
pub(crate) type Clock = fn() -> Instant;

/// Balances of both buckets at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterSnapshot {
    /// Request-count bucket
    pub requests: BucketSnapshot,
    /// Token-count bucket
    pub tokens: BucketSnapshot,
}

/// Costs an acquirer is still waiting to cover.
#[derive(Debug, Clone)]
pub(crate) struct Demand {
    request_units: u32,
    token_units: u64,
    requests: f64,
    tokens: f64,
}

impl Demand {
    pub(crate) fn new(request_units: u32, token_units: u64) -> Self {
        Self {
            request_units,
            token_units,
            requests: f64::from(request_units),
            tokens: token_units as f64,
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug)]
pub(crate) enum Admission {
    Granted(ReservationReceipt),
    Wait(Duration),
}

#[derive(Debug)]
struct DualBucket {
    requests: Bucket,
    tokens: Bucket,
}

impl DualBucket {
    fn refill(&mut self, now: Instant) {
        self.requests.refill(now);
        self.tokens.refill(now);
    }

    /// The slower dimension gates the call.
    fn wait_for(&self, demand: &Demand) -> RateLimitResult<Duration> {
        let requests = self.requests.wait_for(demand.requests)?;
        let tokens = self.tokens.wait_for(demand.tokens)?;
        Ok(requests.max(tokens))
    }
}

/// Both buckets of one limiter behind a short-lived lock.
///
/// The lock is only held for the arithmetic of a single check, refund, or
/// snapshot; never across a wait.
#[derive(Debug)]
pub(crate) struct SharedBuckets {
    id: u64,
    clock: Clock,
    state: Mutex<DualBucket>,
}

impl SharedBuckets {
    pub(crate) fn new(requests: BucketSpec, tokens: BucketSpec, clock: Clock) -> Self {
        let now = clock();
        let id = NEXT_LIMITER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            limiter_id = id,
            request_capacity = requests.capacity,
            request_rate = requests.refill_rate,
            token_capacity = tokens.capacity,
            token_rate = tokens.refill_rate,
            "Creating dual-bucket limiter"
        );
        Self {
            id,
            clock,
            state: Mutex::new(DualBucket {
                requests: Bucket::new("requests", requests, now),
                tokens: Bucket::new("tokens", tokens, now),
            }),
        }
    }

    pub(crate) fn now(&self) -> Instant {
        (self.clock)()
    }

    /// Admit `demand` now, or report how long to wait before checking again.
    ///
    /// After a wait has been issued the demand is clamped to each bucket's
    /// capacity: a cost larger than the bucket has already been paid for in
    /// waiting time, so the re-check only needs a full bucket.
    pub(crate) fn admit(&self, demand: &mut Demand) -> RateLimitResult<Admission> {
        let now = self.now();
        let mut state = self.state.lock();
        state.refill(now);

        let wait = state.wait_for(demand)?;
        if wait.is_zero() {
            state.requests.deduct(demand.requests);
            state.tokens.deduct(demand.tokens);
            trace!(
                limiter_id = self.id,
                requests_available = state.requests.snapshot().available,
                tokens_available = state.tokens.snapshot().available,
                "Reservation granted"
            );
            return Ok(Admission::Granted(ReservationReceipt::new(
                self.id,
                demand.request_units,
                demand.token_units,
            )));
        }

        demand.requests = state.requests.effective_cost(demand.requests);
        demand.tokens = state.tokens.effective_cost(demand.tokens);
        Ok(Admission::Wait(wait))
    }

    /// Wait an acquisition of `demand` would need right now, without reserving.
    pub(crate) fn wait_time(&self, demand: &Demand) -> RateLimitResult<Duration> {
        let now = self.now();
        let mut state = self.state.lock();
        state.refill(now);
        state.wait_for(demand)
    }

    /// Settle a receipt, crediting unused tokens back to the token bucket.
    ///
    /// Usage at or above the reservation credits nothing and debits nothing.
    pub(crate) fn refund(
        &self,
        receipt: &mut ReservationReceipt,
        actual_tokens: u64,
    ) -> RateLimitResult<f64> {
        if receipt.limiter_id() != self.id {
            return Err(RateLimitError::new(RateLimitErrorKind::ForeignReceipt));
        }
        if receipt.is_settled() {
            return Err(RateLimitError::new(RateLimitErrorKind::AlreadySettled));
        }

        let now = self.now();
        let mut state = self.state.lock();
        state.refill(now);

        let unused = receipt.tokens_reserved().saturating_sub(actual_tokens);
        let credited = if unused > 0 {
            state.tokens.credit(unused as f64)
        } else {
            0.0
        };
        receipt.mark_settled();

        debug!(
            limiter_id = self.id,
            reserved = receipt.tokens_reserved(),
            actual_tokens,
            credited,
            "Settled reservation"
        );
        Ok(credited)
    }

    pub(crate) fn snapshot(&self) -> LimiterSnapshot {
        let now = self.now();
        let mut state = self.state.lock();
        state.refill(now);
        LimiterSnapshot {
            requests: state.requests.snapshot(),
            tokens: state.tokens.snapshot(),
        }
    }
}
