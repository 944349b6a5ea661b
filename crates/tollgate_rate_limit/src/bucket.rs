//! Single-dimension token bucket with lazy refill.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tollgate_error::{RateLimitError, RateLimitErrorKind, RateLimitResult};

/// Balances within this distance of the cost count as covered.
///
/// Absorbs float drift between a computed wait and the refill observed after it.
const EPSILON: f64 = 1e-6;

/// Capacity and refill rate for one bucket.
///
/// # Examples
///
/// ```
/// use tollgate_rate_limit::BucketSpec;
///
/// // 2 requests per second: burst of 2, refilling 2 per second
/// let requests = BucketSpec::per_second(2.0);
/// assert_eq!(requests.capacity, 2.0);
/// assert_eq!(requests.refill_rate, 2.0);
///
/// // 600 tokens per minute: burst of 600, refilling 10 per second
/// let tokens = BucketSpec::per_minute(600);
/// assert_eq!(tokens.capacity, 600.0);
/// assert_eq!(tokens.refill_rate, 10.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Maximum instantaneous balance
    pub capacity: f64,
    /// Units restored per second
    pub refill_rate: f64,
}

impl BucketSpec {
    /// Create a spec from an explicit capacity and refill rate.
    ///
    /// Negative or NaN values are treated as zero.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity: non_negative(capacity),
            refill_rate: non_negative(refill_rate),
        }
    }

    /// A per-second rate whose burst capacity equals the rate.
    pub fn per_second(rate: f64) -> Self {
        Self::new(rate, rate)
    }

    /// A per-minute budget: the full minute is available as burst and refills
    /// continuously at `per_minute / 60` per second.
    pub fn per_minute(per_minute: u64) -> Self {
        let per_minute = per_minute as f64;
        Self::new(per_minute, per_minute / 60.0)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.max(0.0) }
}

/// Point-in-time view of one bucket, with refill applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSnapshot {
    /// Current balance
    pub available: f64,
    /// Maximum balance
    pub capacity: f64,
    /// Units restored per second
    pub refill_rate: f64,
}

/// Mutable bucket state. Only touched under the owning limiter's lock.
#[derive(Debug, Clone)]
pub(crate) struct Bucket {
    name: &'static str,
    capacity: f64,
    refill_rate: f64,
    available: f64,
    last_refill: Instant,
}

impl Bucket {
    /// A full bucket.
    pub(crate) fn new(name: &'static str, spec: BucketSpec, now: Instant) -> Self {
        Self {
            name,
            capacity: spec.capacity,
            refill_rate: spec.refill_rate,
            available: spec.capacity,
            last_refill: now,
        }
    }

    /// Apply the refill accrued since the last update.
    pub(crate) fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.available = (self.available + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until the balance covers `cost`, assuming a fresh refill.
    ///
    /// Costs above capacity get the wait needed to accrue the whole cost, which is
    /// always finite when the refill rate is positive.
    pub(crate) fn wait_for(&self, cost: f64) -> RateLimitResult<Duration> {
        let deficit = cost - self.available;
        if deficit <= EPSILON {
            return Ok(Duration::ZERO);
        }

        let unsatisfiable = || {
            RateLimitError::new(RateLimitErrorKind::Unsatisfiable {
                bucket: self.name,
                cost: cost.ceil() as u64,
            })
        };

        if self.refill_rate <= 0.0 {
            return Err(unsatisfiable());
        }

        // Round up to the nanosecond so the refill after sleeping covers the deficit.
        let nanos = (deficit / self.refill_rate * 1e9).ceil();
        if !nanos.is_finite() || nanos >= u64::MAX as f64 {
            return Err(unsatisfiable());
        }
        Ok(Duration::from_nanos(nanos as u64))
    }

    /// The most this bucket can ever hold toward `cost`.
    pub(crate) fn effective_cost(&self, cost: f64) -> f64 {
        cost.min(self.capacity)
    }

    /// Remove `cost`, never going below zero.
    pub(crate) fn deduct(&mut self, cost: f64) {
        self.available = (self.available - cost).max(0.0);
    }

    /// Add `amount` up to capacity and return what was actually credited.
    pub(crate) fn credit(&mut self, amount: f64) -> f64 {
        let before = self.available;
        self.available = (self.available + amount).min(self.capacity);
        self.available - before
    }

    pub(crate) fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            available: self.available,
            capacity: self.capacity,
            refill_rate: self.refill_rate,
        }
    }
}
