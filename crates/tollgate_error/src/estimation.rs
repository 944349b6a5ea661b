//! Token estimation error types.

/// Token estimation error with source location.
///
/// The estimator is a pure function of its input, so this only surfaces when the
/// tokenizer itself cannot be constructed.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Estimation Error: {} at line {} in {}", message, line, file)]
pub struct EstimationError {
    /// Error message
    pub message: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl EstimationError {
    /// Create a new EstimationError with the given message at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use tollgate_error::EstimationError;
    ///
    /// let err = EstimationError::new("Failed to load encoding 'cl100k_base'");
    /// assert!(err.message.contains("cl100k_base"));
    /// ```
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
