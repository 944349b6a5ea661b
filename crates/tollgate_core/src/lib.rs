//! Core data types for the Tollgate admission-control library.
//!
//! This crate provides the conversation message types, token usage records, and the
//! token-cost estimator that feeds the admission controller.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod content;
mod estimator;
mod message;
mod role;
mod telemetry;
mod token_usage;

pub use content::{Content, ContentPart};
pub use estimator::TokenEstimator;
pub use message::Message;
pub use role::Role;
pub use telemetry::init_tracing;
pub use token_usage::{ReportsUsage, TokenUsage};
