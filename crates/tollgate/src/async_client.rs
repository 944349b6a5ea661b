//! Async rate-limited conversation client.

use crate::{
    AsyncConversationExecutor, AsyncConversationStreamExecutor, AsyncResourceExecutor,
    ConversationAction, ConversationRequest, ConversationResponse, MeteredEventStream,
    ResourceAction,
};
use std::future::Future;
use std::time::Duration;
use tollgate_core::TokenEstimator;
use tollgate_error::{RemoteError, RemoteErrorKind, TollgateResult};
use tollgate_rate_limit::{AsyncRateLimiter, AttemptPhase, LimiterConfig, RetryPolicy};
use tracing::{debug, instrument, warn};

/// Async counterpart of [`RateLimitedClient`](crate::RateLimitedClient).
///
/// Concurrent tasks sharing one client are admitted strictly one after another.
/// Each remote call is bounded by the configured timeout; a timed-out call counts
/// as a non-retryable failure and its whole reservation is returned.
///
/// Streamed calls are bounded by the timeout only until the stream opens.
///
/// Dropping a returned future at any point never leaks a reservation.
#[derive(Debug)]
pub struct AsyncRateLimitedClient<E> {
    executor: E,
    limiter: AsyncRateLimiter,
    estimator: TokenEstimator,
    policy: RetryPolicy,
    timeout: Duration,
}

impl<E> AsyncRateLimitedClient<E> {
    /// Create a client counting tokens with the `cl100k_base` encoding.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the encoding cannot be loaded.
    pub fn new(config: &LimiterConfig, executor: E) -> TollgateResult<Self> {
        let estimator = TokenEstimator::cl100k()?;
        Self::with_estimator(config, executor, estimator)
    }

    /// Create a client with an explicit token estimator.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    #[instrument(skip(executor, estimator))]
    pub fn with_estimator(
        config: &LimiterConfig,
        executor: E,
        estimator: TokenEstimator,
    ) -> TollgateResult<Self> {
        config.validate()?;
        Ok(Self {
            executor,
            limiter: AsyncRateLimiter::from_config(config),
            estimator,
            policy: RetryPolicy::from_config(config)?,
            timeout: config.timeout()?,
        })
    }

    /// The limiter shared by every call of this client.
    pub fn limiter(&self) -> &AsyncRateLimiter {
        &self.limiter
    }

    /// The executor calls are sent through.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn estimate(&self, request: &ConversationRequest) -> u64 {
        let estimated = self.estimator.estimate_request(&request.prompt_messages());
        debug!(phase = %AttemptPhase::Estimating, estimated);
        estimated
    }
}

/// Bound one remote call by `timeout`, reporting expiry as a remote timeout.
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Remote call timed out");
            Err(RemoteError::new(RemoteErrorKind::Timeout(timeout)))
        }
    }
}

impl<E: AsyncConversationExecutor> AsyncRateLimitedClient<E> {
    /// Open a new conversation.
    pub async fn start(
        &self,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        self.dispatch(ConversationAction::Start, request).await
    }

    /// Add entries to an existing conversation.
    pub async fn append(
        &self,
        conversation_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let action = ConversationAction::Append {
            conversation_id: conversation_id.to_string(),
        };
        self.dispatch(action, request).await
    }

    /// Branch an existing conversation from an earlier entry.
    pub async fn restart(
        &self,
        conversation_id: &str,
        from_entry_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let action = ConversationAction::Restart {
            conversation_id: conversation_id.to_string(),
            from_entry_id: from_entry_id.to_string(),
        };
        self.dispatch(action, request).await
    }

    #[instrument(skip_all, fields(%action))]
    async fn dispatch(
        &self,
        action: ConversationAction,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let estimated = self.estimate(request);
        let executor = &self.executor;
        let action = &action;
        let timeout = self.timeout;
        self.limiter
            .execute(&self.policy, estimated, move || {
                bounded(timeout, executor.send(action, request))
            })
            .await
    }
}

impl<E: AsyncConversationStreamExecutor> AsyncRateLimitedClient<E> {
    /// Open a new conversation, streaming the response.
    ///
    /// The estimate stays reserved until the stream reports usage; see
    /// [`MeteredEventStream`].
    pub async fn start_stream(
        &self,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEventStream<'_>> {
        self.dispatch_stream(ConversationAction::Start, request).await
    }

    /// Add entries to an existing conversation, streaming the response.
    pub async fn append_stream(
        &self,
        conversation_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEventStream<'_>> {
        let action = ConversationAction::Append {
            conversation_id: conversation_id.to_string(),
        };
        self.dispatch_stream(action, request).await
    }

    /// Branch an existing conversation, streaming the response.
    pub async fn restart_stream(
        &self,
        conversation_id: &str,
        from_entry_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEventStream<'_>> {
        let action = ConversationAction::Restart {
            conversation_id: conversation_id.to_string(),
            from_entry_id: from_entry_id.to_string(),
        };
        self.dispatch_stream(action, request).await
    }

    #[instrument(skip_all, fields(%action, stream = true))]
    async fn dispatch_stream(
        &self,
        action: ConversationAction,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEventStream<'_>> {
        let estimated = self.estimate(request);
        let executor = &self.executor;
        let action = &action;
        let timeout = self.timeout;
        let (events, reservation) = self
            .limiter
            .execute_deferred(&self.policy, estimated, move || {
                bounded(timeout, executor.send_stream(action, request))
            })
            .await?;
        Ok(MeteredEventStream::new(events, reservation))
    }
}

impl<E: AsyncResourceExecutor> AsyncRateLimitedClient<E> {
    /// Perform a conversation or agent management call at its fixed token cost.
    #[instrument(skip_all, fields(%action))]
    pub async fn perform(&self, action: &ResourceAction) -> TollgateResult<serde_json::Value> {
        let executor = &self.executor;
        let timeout = self.timeout;
        self.limiter
            .execute_fixed(&self.policy, action.token_cost(), move || {
                bounded(timeout, executor.call(action))
            })
            .await
    }
}
