//! Seams to the remote conversation API.
//!
//! Implementations perform one HTTP round trip per call and classify failures into
//! [`RemoteErrorKind`](tollgate_error::RemoteErrorKind). A quota rejection must be
//! reported as `RemoteErrorKind::RateLimited`; it is the only failure the clients
//! retry.

use crate::{
    ConversationAction, ConversationEvent, ConversationRequest, ConversationResponse,
    ResourceAction,
};
use async_trait::async_trait;
use futures_util::Stream;
use std::pin::Pin;
use tollgate_error::RemoteError;

/// Events of an open blocking stream.
pub type EventIter = Box<dyn Iterator<Item = Result<ConversationEvent, RemoteError>> + Send>;

/// Events of an open async stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ConversationEvent, RemoteError>> + Send>>;

/// Blocking conversation backend.
pub trait ConversationExecutor: Send + Sync {
    /// Perform `action` with `request` and return the parsed response.
    fn send(
        &self,
        action: &ConversationAction,
        request: &ConversationRequest,
    ) -> Result<ConversationResponse, RemoteError>;
}

/// Async conversation backend.
#[async_trait]
pub trait AsyncConversationExecutor: Send + Sync {
    /// Perform `action` with `request` and return the parsed response.
    async fn send(
        &self,
        action: &ConversationAction,
        request: &ConversationRequest,
    ) -> Result<ConversationResponse, RemoteError>;
}

/// Blocking backend for streamed conversation actions.
///
/// `send_stream` returns once the remote has accepted the request; a rejection
/// at that point is reported as an `Err` so it can be retried. Failures after
/// that arrive as `Err` items of the iterator.
pub trait ConversationStreamExecutor: Send + Sync {
    /// Open a stream performing `action` with `request`.
    fn send_stream(
        &self,
        action: &ConversationAction,
        request: &ConversationRequest,
    ) -> Result<EventIter, RemoteError>;
}

/// Async backend for streamed conversation actions.
#[async_trait]
pub trait AsyncConversationStreamExecutor: Send + Sync {
    /// Open a stream performing `action` with `request`.
    async fn send_stream(
        &self,
        action: &ConversationAction,
        request: &ConversationRequest,
    ) -> Result<EventStream, RemoteError>;
}

/// Blocking backend for conversation and agent management calls.
pub trait ResourceExecutor: Send + Sync {
    /// Perform `action` and return the response body.
    fn call(&self, action: &ResourceAction) -> Result<serde_json::Value, RemoteError>;
}

/// Async backend for conversation and agent management calls.
#[async_trait]
pub trait AsyncResourceExecutor: Send + Sync {
    /// Perform `action` and return the response body.
    async fn call(&self, action: &ResourceAction) -> Result<serde_json::Value, RemoteError>;
}
