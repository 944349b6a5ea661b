//! Client-side admission control for quota-limited remote APIs.
//!
//! A limiter holds two token buckets that must both allow a call before it is
//! dispatched:
//! - a **request** bucket, refilled at `requests_per_second`
//! - a **token** bucket, holding `tokens_per_minute` and refilled continuously
//!
//! Calls reserve an *estimated* token cost up front and settle the reservation
//! once the real usage is known, crediting back whatever was over-estimated.
//!
//! Two facades share one engine:
//! - [`RateLimiter`] blocks the calling thread while waiting
//! - [`AsyncRateLimiter`] suspends the calling task and supports cancellation
//!
//! Both offer `execute`, which wraps a remote call with acquisition, settlement,
//! and exponential backoff on rate-limit rejections (see [`RetryPolicy`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod blocking;
mod bucket;
mod config;
mod engine;
mod receipt;
mod reservation;
mod retry;
mod suspending;

pub use blocking::RateLimiter;
pub use bucket::{BucketSnapshot, BucketSpec};
pub use config::LimiterConfig;
pub use engine::LimiterSnapshot;
pub use receipt::ReservationReceipt;
pub use reservation::Reservation;
pub use retry::{AttemptPhase, RetryPolicy};
pub use suspending::AsyncRateLimiter;
