//! Error types for the Tollgate library.
//!
//! This crate provides the foundation error types used throughout the Tollgate workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! Only [`RemoteErrorKind::RateLimited`] is treated as recoverable by the retry
//! wrapper; every other error propagates on first occurrence.
//!
//! # Examples
//!
//! ```
//! use tollgate_error::{RemoteError, RemoteErrorKind, TollgateResult};
//!
//! fn call_remote() -> TollgateResult<String> {
//!     Err(RemoteError::new(RemoteErrorKind::Network("connection refused".to_string())))?
//! }
//!
//! match call_remote() {
//!     Ok(body) => println!("Got: {}", body),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod estimation;
mod rate_limit;
mod remote;

pub use config::ConfigError;
pub use error::{TollgateError, TollgateErrorKind, TollgateResult};
pub use estimation::EstimationError;
pub use rate_limit::{RateLimitError, RateLimitErrorKind, RateLimitResult};
pub use remote::{RemoteError, RemoteErrorKind};
