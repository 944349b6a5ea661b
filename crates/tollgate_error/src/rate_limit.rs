//! Error types for admission control.

use std::time::Duration;

/// Error kinds for admission-control operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum RateLimitErrorKind {
    /// Every retry was answered with a rate-limit rejection.
    #[display(
        "Rate limit retries exhausted after {} attempts (last delay {:?})",
        attempts,
        last_delay
    )]
    Exhausted {
        /// Total call attempts made (initial call plus retries)
        attempts: u32,
        /// Backoff delay slept before the final attempt
        last_delay: Duration,
    },
    /// The caller cancelled while waiting for admission. Nothing was reserved.
    #[display("Acquisition cancelled before admission")]
    Cancelled,
    /// A bucket with a zero refill rate can never cover the requested cost.
    #[display("Cost {} can never be satisfied by the {} bucket", cost, bucket)]
    Unsatisfiable {
        /// Bucket name ("requests" or "tokens")
        bucket: &'static str,
        /// Requested cost, rounded up
        cost: u64,
    },
    /// The receipt was already refunded or released.
    #[display("Reservation receipt already settled")]
    AlreadySettled,
    /// The receipt was issued by a different limiter instance.
    #[display("Reservation receipt belongs to another limiter")]
    ForeignReceipt,
}

/// Admission-control error with location tracking.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tollgate_error::{RateLimitError, RateLimitErrorKind};
///
/// let err = RateLimitError::new(RateLimitErrorKind::Exhausted {
///     attempts: 4,
///     last_delay: Duration::from_secs(4),
/// });
/// assert!(err.is_exhausted());
/// assert!(format!("{}", err).contains("4 attempts"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Rate Limit Error: {} at line {} in {}", kind, line, file)]
pub struct RateLimitError {
    kind: RateLimitErrorKind,
    line: u32,
    file: &'static str,
}

impl RateLimitError {
    /// Create a new rate limiting error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RateLimitErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &RateLimitErrorKind {
        &self.kind
    }

    /// True for [`RateLimitErrorKind::Exhausted`].
    pub fn is_exhausted(&self) -> bool {
        matches!(self.kind, RateLimitErrorKind::Exhausted { .. })
    }

    /// True for [`RateLimitErrorKind::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, RateLimitErrorKind::Cancelled)
    }
}

impl From<RateLimitErrorKind> for RateLimitError {
    #[track_caller]
    fn from(kind: RateLimitErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for admission-control operations.
pub type RateLimitResult<T> = std::result::Result<T, RateLimitError>;
