//! Blocking rate-limited conversation client.

use crate::{
    ConversationAction, ConversationExecutor, ConversationRequest, ConversationResponse,
    ConversationStreamExecutor, MeteredEvents, ResourceAction, ResourceExecutor,
};
use tollgate_core::TokenEstimator;
use tollgate_error::TollgateResult;
use tollgate_rate_limit::{AttemptPhase, LimiterConfig, RateLimiter, RetryPolicy};
use tracing::{debug, instrument};

/// Conversation client that keeps every call inside the configured quotas.
///
/// Each entry point estimates the request's token cost, waits for admission,
/// performs the call through the executor, and settles the reservation against
/// the usage the remote reports. Rate-limit rejections are retried with
/// exponential backoff; any other failure is returned on first occurrence.
///
/// Which entry points are available depends on the executor: conversation calls
/// need [`ConversationExecutor`], streamed calls [`ConversationStreamExecutor`],
/// and management calls [`ResourceExecutor`].
///
/// The client is `Sync` and can be shared between threads behind an `Arc`; all
/// threads then draw from the same pair of buckets.
#[derive(Debug)]
pub struct RateLimitedClient<E> {
    executor: E,
    limiter: RateLimiter,
    estimator: TokenEstimator,
    policy: RetryPolicy,
}

impl<E> RateLimitedClient<E> {
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
            limiter: RateLimiter::from_config(config),
            estimator,
            policy: RetryPolicy::from_config(config)?,
        })
    }

    /// The limiter shared by every call of this client.
    pub fn limiter(&self) -> &RateLimiter {
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

impl<E: ConversationExecutor> RateLimitedClient<E> {
    /// Open a new conversation.
    pub fn start(&self, request: &ConversationRequest) -> TollgateResult<ConversationResponse> {
        self.dispatch(ConversationAction::Start, request)
    }

    /// Add entries to an existing conversation.
    pub fn append(
        &self,
        conversation_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let action = ConversationAction::Append {
            conversation_id: conversation_id.to_string(),
        };
        self.dispatch(action, request)
    }

    /// Branch an existing conversation from an earlier entry.
    pub fn restart(
        &self,
        conversation_id: &str,
        from_entry_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let action = ConversationAction::Restart {
            conversation_id: conversation_id.to_string(),
            from_entry_id: from_entry_id.to_string(),
        };
        self.dispatch(action, request)
    }

    #[instrument(skip_all, fields(%action))]
    fn dispatch(
        &self,
        action: ConversationAction,
        request: &ConversationRequest,
    ) -> TollgateResult<ConversationResponse> {
        let estimated = self.estimate(request);
        self.limiter
            .execute(&self.policy, estimated, || self.executor.send(&action, request))
    }
}

impl<E: ConversationStreamExecutor> RateLimitedClient<E> {
    /// Open a new conversation, streaming the response.
    ///
    /// The estimate stays reserved until the stream reports usage; see
    /// [`MeteredEvents`].
    pub fn start_stream(&self, request: &ConversationRequest) -> TollgateResult<MeteredEvents<'_>> {
        self.dispatch_stream(ConversationAction::Start, request)
    }

    /// Add entries to an existing conversation, streaming the response.
    pub fn append_stream(
        &self,
        conversation_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEvents<'_>> {
        let action = ConversationAction::Append {
            conversation_id: conversation_id.to_string(),
        };
        self.dispatch_stream(action, request)
    }

    /// Branch an existing conversation, streaming the response.
    pub fn restart_stream(
        &self,
        conversation_id: &str,
        from_entry_id: &str,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEvents<'_>> {
        let action = ConversationAction::Restart {
            conversation_id: conversation_id.to_string(),
            from_entry_id: from_entry_id.to_string(),
        };
        self.dispatch_stream(action, request)
    }

    #[instrument(skip_all, fields(%action, stream = true))]
    fn dispatch_stream(
        &self,
        action: ConversationAction,
        request: &ConversationRequest,
    ) -> TollgateResult<MeteredEvents<'_>> {
        let estimated = self.estimate(request);
        let (events, reservation) = self.limiter.execute_deferred(&self.policy, estimated, || {
            self.executor.send_stream(&action, request)
        })?;
        Ok(MeteredEvents::new(events, reservation))
    }
}

impl<E: ResourceExecutor> RateLimitedClient<E> {
    /// Perform a conversation or agent management call at its fixed token cost.
    ///
    /// The cost is charged per attempt and kept once the call succeeds.
    #[instrument(skip_all, fields(%action))]
    pub fn perform(&self, action: &ResourceAction) -> TollgateResult<serde_json::Value> {
        self.limiter
            .execute_fixed(&self.policy, action.token_cost(), || self.executor.call(action))
    }
}
