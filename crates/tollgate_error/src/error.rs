//! Top-level error wrapper types.

use crate::{ConfigError, EstimationError, RateLimitError, RemoteError};

/// Every failure a Tollgate operation can surface.
///
/// # Examples
///
/// ```
/// use tollgate_error::{ConfigError, TollgateError, TollgateErrorKind};
///
/// let err: TollgateError = ConfigError::new("tokens_per_minute must be positive").into();
/// assert!(matches!(err.kind(), TollgateErrorKind::Config(_)));
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum TollgateErrorKind {
    /// Token estimation failed
    #[from(EstimationError)]
    Estimation(EstimationError),
    /// Admission control failure (retries exhausted, cancellation, bad receipt)
    #[from(RateLimitError)]
    RateLimit(RateLimitError),
    /// Non-rate-limit failure reported by the remote executor
    #[from(RemoteError)]
    Remote(RemoteError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Tollgate error with kind discrimination.
///
/// # Examples
///
/// ```
/// use tollgate_error::{RateLimitError, RateLimitErrorKind, TollgateResult};
///
/// fn acquire() -> TollgateResult<()> {
///     Err(RateLimitError::new(RateLimitErrorKind::Cancelled))?
/// }
///
/// let err = acquire().unwrap_err();
/// assert!(err.is_cancelled());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Tollgate Error: {}", _0)]
pub struct TollgateError(Box<TollgateErrorKind>);

impl TollgateError {
    /// Create a new error from a kind.
    pub fn new(kind: TollgateErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &TollgateErrorKind {
        &self.0
    }

    /// Consume the wrapper and return the kind.
    pub fn into_kind(self) -> TollgateErrorKind {
        *self.0
    }

    /// The rate-limit error, if this is one.
    pub fn as_rate_limit(&self) -> Option<&RateLimitError> {
        match self.kind() {
            TollgateErrorKind::RateLimit(e) => Some(e),
            _ => None,
        }
    }

    /// The remote error, if this is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self.kind() {
            TollgateErrorKind::Remote(e) => Some(e),
            _ => None,
        }
    }

    /// True when all retry attempts were consumed by rate-limit rejections.
    pub fn is_exhausted(&self) -> bool {
        self.as_rate_limit().is_some_and(RateLimitError::is_exhausted)
    }

    /// True when the caller cancelled while waiting for admission.
    pub fn is_cancelled(&self) -> bool {
        self.as_rate_limit().is_some_and(RateLimitError::is_cancelled)
    }
}

// Generic From implementation for any type that converts to TollgateErrorKind
impl<T> From<T> for TollgateError
where
    T: Into<TollgateErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Tollgate operations.
pub type TollgateResult<T> = std::result::Result<T, TollgateError>;
