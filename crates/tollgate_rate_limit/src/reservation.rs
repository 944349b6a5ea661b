//! Reservations that settle themselves.

use crate::ReservationReceipt;
use crate::engine::SharedBuckets;
use tollgate_error::RateLimitResult;

/// An admitted call whose usage is not known yet.
///
/// Settle it with [`settle`](Self::settle) once the remote reports usage. A
/// reservation dropped unsettled (panic, cancelled future, abandoned stream) is
/// released in full: no response means no tokens used.
///
/// Obtained from `execute_deferred` on either limiter.
#[derive(Debug)]
#[must_use = "dropping a reservation releases it in full"]
pub struct Reservation<'a> {
    buckets: &'a SharedBuckets,
    receipt: ReservationReceipt,
}

impl<'a> Reservation<'a> {
    pub(crate) fn new(buckets: &'a SharedBuckets, receipt: ReservationReceipt) -> Self {
        Self { buckets, receipt }
    }

    /// Tokens charged for this reservation.
    pub fn tokens_reserved(&self) -> u64 {
        self.receipt.tokens_reserved()
    }

    /// The underlying receipt.
    pub fn receipt(&self) -> &ReservationReceipt {
        &self.receipt
    }

    /// Settle against the tokens actually used, returning the amount credited back.
    pub fn settle(mut self, actual_tokens: u64) -> RateLimitResult<f64> {
        self.buckets.refund(&mut self.receipt, actual_tokens)
    }

    /// Settle with zero usage, returning the whole estimate.
    pub fn release(self) -> RateLimitResult<f64> {
        self.settle(0)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.receipt.is_settled() {
            // Only fails for receipts from another limiter, which cannot happen here.
            let _ = self.buckets.refund(&mut self.receipt, 0);
        }
    }
}
