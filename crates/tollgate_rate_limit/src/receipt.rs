//! Reservation receipts returned by a successful acquisition.

use std::time::Duration;

/// Record of a provisional charge against a limiter.
///
/// A receipt is settled exactly once with `refund` (or `release`) once the real
/// usage is known. Settling it a second time, or against a limiter that did not
/// issue it, is rejected.
///
/// # Examples
///
/// ```
/// use tollgate_rate_limit::RateLimiter;
///
/// let limiter = RateLimiter::new(10.0, 6_000);
/// let mut receipt = limiter.acquire(100).unwrap();
/// assert_eq!(receipt.tokens_reserved(), 100);
///
/// limiter.refund(&mut receipt, 40).unwrap();
/// assert!(receipt.is_settled());
/// assert!(limiter.refund(&mut receipt, 40).is_err());
/// ```
#[derive(Debug, PartialEq)]
#[must_use = "settle the reservation with `refund` or `release` once usage is known"]
pub struct ReservationReceipt {
    limiter_id: u64,
    requests_reserved: u32,
    tokens_reserved: u64,
    waited: Duration,
    settled: bool,
}

impl ReservationReceipt {
    pub(crate) fn new(limiter_id: u64, requests_reserved: u32, tokens_reserved: u64) -> Self {
        Self {
            limiter_id,
            requests_reserved,
            tokens_reserved,
            waited: Duration::ZERO,
            settled: false,
        }
    }

    pub(crate) fn with_waited(mut self, waited: Duration) -> Self {
        self.waited = waited;
        self
    }

    pub(crate) fn limiter_id(&self) -> u64 {
        self.limiter_id
    }

    pub(crate) fn mark_settled(&mut self) {
        self.settled = true;
    }

    /// Request units charged.
    pub fn requests_reserved(&self) -> u32 {
        self.requests_reserved
    }

    /// Token estimate charged.
    pub fn tokens_reserved(&self) -> u64 {
        self.tokens_reserved
    }

    /// Time spent waiting for admission.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Whether the reservation has already been refunded or released.
    pub fn is_settled(&self) -> bool {
        self.settled
    }
}
