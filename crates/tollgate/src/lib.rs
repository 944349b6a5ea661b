//! Tollgate - client-side admission control for conversation APIs
//!
//! Tollgate keeps a client inside a remote API's quotas before the server has to
//! reject anything. Every call is charged against two token buckets (requests per
//! second and tokens per minute), the token estimate is reconciled against the
//! usage the server reports, and rate-limit rejections are retried with
//! exponential backoff.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use tollgate::{ConversationRequest, LimiterConfig, Message, RateLimitedClient};
//!
//! let config = LimiterConfig::load()?;
//! let client = RateLimitedClient::new(&config, MyExecutor::default())?;
//!
//! let request = ConversationRequest::new(vec![Message::user("Hello!")]);
//! let response = client.start(&request)?;
//! let follow_up = client.append(&response.conversation_id, &request)?;
//! ```
//!
//! Streamed calls hold their estimate until the terminal usage event arrives,
//! and management calls (listings, lookups, agent changes) are charged a fixed
//! cost:
//!
//! ```rust,ignore
//! for event in client.start_stream(&request)? {
//!     if let ConversationEvent::OutputDelta { content } = event? {
//!         print!("{content}");
//!     }
//! }
//!
//! let history = client.perform(&ResourceAction::GetHistory {
//!     conversation_id: "conv-1".to_string(),
//! })?;
//! ```
//!
//! # Architecture
//!
//! - `tollgate_error` - error types
//! - `tollgate_core` - messages, token usage, token estimation, tracing setup
//! - `tollgate_rate_limit` - bucket engine, blocking and async limiters, retry
//! - `tollgate` - executor traits and the rate-limited clients
//!
//! This crate re-exports everything for convenience.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod async_client;
mod client;
mod executor;
mod request;
mod resource;
mod stream;

pub use async_client::AsyncRateLimitedClient;
pub use client::RateLimitedClient;
pub use executor::{
    AsyncConversationExecutor, AsyncConversationStreamExecutor, AsyncResourceExecutor,
    ConversationExecutor, ConversationStreamExecutor, EventIter, EventStream, ResourceExecutor,
};
pub use request::{
    ConversationAction, ConversationEvent, ConversationRequest, ConversationResponse,
};
pub use resource::{ResourceAction, AGENT_WRITE_TOKENS, DELETE_TOKENS, LOOKUP_TOKENS};
pub use stream::{MeteredEventStream, MeteredEvents};

pub use tollgate_core::{
    init_tracing, Content, ContentPart, Message, ReportsUsage, Role, TokenEstimator, TokenUsage,
};
pub use tollgate_error::{
    ConfigError, EstimationError, RateLimitError, RateLimitErrorKind, RemoteError,
    RemoteErrorKind, TollgateError, TollgateErrorKind, TollgateResult,
};
pub use tollgate_rate_limit::{
    AsyncRateLimiter, AttemptPhase, BucketSnapshot, BucketSpec, LimiterConfig,
    LimiterSnapshot, RateLimiter, Reservation, ReservationReceipt, RetryPolicy,
};
