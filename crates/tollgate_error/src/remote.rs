//! Errors reported by the remote call executor.

use std::time::Duration;

/// Remote failure conditions.
///
/// `RateLimited` is the distinguished rejection the retry wrapper branches on.
/// Every other kind is propagated to the caller untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum RemoteErrorKind {
    /// Server-side quota exceeded (HTTP 429)
    #[display("Rate limited by remote (retry after {:?})", retry_after)]
    RateLimited {
        /// Server-suggested wait, when the response carried one
        retry_after: Option<Duration>,
    },
    /// No response arrived within the call timeout
    #[display("Remote call timed out after {:?}", _0)]
    Timeout(Duration),
    /// Credentials rejected
    #[display("Authentication failed: {}", _0)]
    Authentication(String),
    /// Request rejected as malformed
    #[display("Invalid request: {}", _0)]
    InvalidRequest(String),
    /// Transport-level failure
    #[display("Network error: {}", _0)]
    Network(String),
    /// Any other API failure
    #[display("API error {}: {}", status, message)]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
}

impl RemoteErrorKind {
    /// Classify an HTTP status code and message.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_error::RemoteErrorKind;
    ///
    /// assert!(RemoteErrorKind::from_status(429, "slow down").is_rate_limit());
    /// assert!(!RemoteErrorKind::from_status(401, "bad key").is_rate_limit());
    /// ```
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => RemoteErrorKind::RateLimited { retry_after: None },
            408 => RemoteErrorKind::Timeout(Duration::ZERO),
            401 | 403 => RemoteErrorKind::Authentication(message),
            400 | 422 => RemoteErrorKind::InvalidRequest(message),
            _ => RemoteErrorKind::Api { status, message },
        }
    }

    /// Classify a free-form SDK error message.
    ///
    /// Messages mentioning "429" or "rate limit" are rate-limit rejections,
    /// anything else is a generic API failure.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("429") || lower.contains("rate limit") {
            RemoteErrorKind::RateLimited { retry_after: None }
        } else {
            RemoteErrorKind::Api { status: 0, message }
        }
    }

    /// Check if this is a rate-limit rejection.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, RemoteErrorKind::RateLimited { .. })
    }

    /// Server-suggested wait carried by a rate-limit rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteErrorKind::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Remote error with source location tracking.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tollgate_error::{RemoteError, RemoteErrorKind};
///
/// let err = RemoteError::new(RemoteErrorKind::RateLimited {
///     retry_after: Some(Duration::from_secs(2)),
/// });
/// assert!(err.is_rate_limit());
/// assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Remote Error: {} at line {} in {}", kind, line, file)]
pub struct RemoteError {
    /// The kind of error that occurred
    pub kind: RemoteErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl RemoteError {
    /// Create a new RemoteError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: RemoteErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for a rate-limit rejection.
    #[track_caller]
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self::new(RemoteErrorKind::RateLimited { retry_after })
    }

    /// Check if this is a rate-limit rejection.
    pub fn is_rate_limit(&self) -> bool {
        self.kind.is_rate_limit()
    }

    /// Server-suggested wait carried by a rate-limit rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        self.kind.retry_after()
    }
}
