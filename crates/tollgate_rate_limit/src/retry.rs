//! Retry with exponential backoff around a rate-limited remote call.
//!
//! Each attempt moves through `Acquiring -> Calling` and ends in `Succeeded`,
//! `RateLimited`, or `Failed`:
//! - **Succeeded**: the reservation is settled against the reported usage.
//! - **RateLimited**: the reservation is released in full, and if retries remain the
//!   wrapper sleeps `min(max_delay, base_delay * 2^attempt)` and acquires again.
//! - **Failed**: any other remote error. The reservation is released in full and the
//!   error is returned untouched.
//!
//! If the call panics or the async future is dropped mid-call, the reservation is
//! released in full as well: no response means no tokens used.
//!
//! Three settlement styles share the same retry loop:
//! - `execute` settles against the usage the response reports
//! - `execute_fixed` keeps the whole charge, for calls that report no usage
//! - `execute_deferred` hands the open [`Reservation`] back to the caller

use crate::{AsyncRateLimiter, LimiterConfig, RateLimiter, Reservation};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tollgate_core::ReportsUsage;
use tollgate_error::{
    RateLimitError, RateLimitErrorKind, RemoteError, TollgateError, TollgateResult,
};
use tracing::{debug, instrument, warn};

/// Largest extra fraction of the backoff added when jitter is enabled.
const JITTER_FRACTION: f64 = 0.25;

/// Where a call attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum AttemptPhase {
    /// Estimating the token cost of the request
    #[display("estimating")]
    Estimating,
    /// Waiting for admission
    #[display("acquiring")]
    Acquiring,
    /// Remote call in flight
    #[display("calling")]
    Calling,
    /// Response received and reservation settled
    #[display("succeeded")]
    Succeeded,
    /// Remote rejected the call for exceeding its quota
    #[display("rate_limited")]
    RateLimited,
    /// Non-retryable failure or retries exhausted
    #[display("failed")]
    Failed,
}

/// Retry policy for rate-limit rejections.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tollgate_rate_limit::RetryPolicy;
///
/// let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(32));
/// assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
/// assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
/// assert_eq!(policy.backoff_delay(10), Duration::from_secs(32));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// Create a policy without jitter.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    /// Build the policy described by a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the delays are not valid durations.
    pub fn from_config(config: &LimiterConfig) -> TollgateResult<Self> {
        Ok(Self::new(config.max_retries, config.base_delay()?, config.max_delay()?)
            .with_jitter(config.jitter))
    }

    /// Enable or disable jitter.
    ///
    /// Jitter only lengthens a delay (by up to a quarter), so no retry ever waits
    /// less than its plain backoff.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Retries allowed after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Upper bound on any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Plain exponential backoff for a 0-based retry index, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay actually slept before retry `attempt`.
    ///
    /// A server-suggested `retry_after` lengthens the backoff but never past
    /// `max_delay`.
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let mut delay = self.backoff_delay(attempt);
        if self.jitter {
            let extra = rand::thread_rng().gen_range(0.0..JITTER_FRACTION);
            delay += delay.mul_f64(extra);
        }
        if let Some(retry_after) = retry_after {
            delay = delay.max(retry_after);
        }
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(32))
    }
}

/// Attempt counter for one logical call.
#[derive(Debug)]
struct Backoff<'a> {
    policy: &'a RetryPolicy,
    retries: u32,
    last_delay: Duration,
}

impl<'a> Backoff<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            retries: 0,
            last_delay: Duration::ZERO,
        }
    }

    /// Attempts made so far, counting the one in progress.
    fn attempt(&self) -> u32 {
        self.retries + 1
    }

    /// Delay before the next attempt, or the exhaustion error.
    fn after_rejection(&mut self, rejection: &RemoteError) -> Result<Duration, RateLimitError> {
        if self.retries >= self.policy.max_retries {
            warn!(
                phase = %AttemptPhase::Failed,
                attempts = self.attempt(),
                "Rate limit retries exhausted"
            );
            return Err(RateLimitError::new(RateLimitErrorKind::Exhausted {
                attempts: self.attempt(),
                last_delay: self.last_delay,
            }));
        }

        let delay = self
            .policy
            .delay_for(self.retries, rejection.retry_after());
        warn!(
            phase = %AttemptPhase::RateLimited,
            attempt = self.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Rate limited by remote, backing off"
        );
        self.retries += 1;
        self.last_delay = delay;
        Ok(delay)
    }
}

/// Classify a finished call: hand back the open reservation on success, release
/// it and decide what happens next on failure.
fn conclude<'a, T>(
    reservation: Reservation<'a>,
    outcome: Result<T, RemoteError>,
    backoff: &mut Backoff<'_>,
) -> Result<Result<(T, Reservation<'a>), Duration>, TollgateError> {
    match outcome {
        Ok(value) => Ok(Ok((value, reservation))),
        Err(err) => {
            reservation.release()?;
            if !err.is_rate_limit() {
                warn!(phase = %AttemptPhase::Failed, error = %err, "Remote call failed");
                return Err(err.into());
            }
            Ok(Err(backoff.after_rejection(&err)?))
        }
    }
}

/// Settle against the usage the response reports.
fn settle_usage<T: ReportsUsage>(response: T, reservation: Reservation<'_>) -> TollgateResult<T> {
    let actual = response.tokens_used();
    reservation.settle(actual)?;
    debug!(phase = %AttemptPhase::Succeeded, actual_tokens = actual, "Call succeeded");
    Ok(response)
}

/// Keep the whole charge: fixed-cost calls report no usage.
fn consume_fixed<T>(value: T, reservation: Reservation<'_>) -> TollgateResult<T> {
    let cost = reservation.tokens_reserved();
    reservation.settle(cost)?;
    debug!(phase = %AttemptPhase::Succeeded, cost, "Fixed-cost call succeeded");
    Ok(value)
}

impl RateLimiter {
    /// Run `call` under admission control, retrying rate-limit rejections.
    ///
    /// `estimated_tokens` is reserved before every attempt. On success the unused
    /// part of the estimate is refunded using the response's reported usage.
    ///
    /// # Errors
    ///
    /// - `RateLimitErrorKind::Exhausted` when every attempt was rate limited
    /// - the remote error itself for any other failure, on first occurrence
    ///
    /// # Example
    ///
    /// ```
    /// use tollgate_core::TokenUsage;
    /// use tollgate_rate_limit::{RateLimiter, RetryPolicy};
    ///
    /// let limiter = RateLimiter::new(10.0, 60_000);
    /// let usage = limiter
    ///     .execute(&RetryPolicy::default(), 500, || Ok(TokenUsage::new(120, 80)))
    ///     .unwrap();
    /// assert_eq!(usage.total_tokens(), 200);
    /// ```
    pub fn execute<T, F>(
        &self,
        policy: &RetryPolicy,
        estimated_tokens: u64,
        call: F,
    ) -> TollgateResult<T>
    where
        T: ReportsUsage,
        F: FnMut() -> Result<T, RemoteError>,
    {
        let (response, reservation) = self.execute_deferred(policy, estimated_tokens, call)?;
        settle_usage(response, reservation)
    }

    /// Run a call whose cost is known up front and never refunded.
    ///
    /// Used for lookups, listings, and deletions that report no token usage.
    pub fn execute_fixed<T, F>(
        &self,
        policy: &RetryPolicy,
        token_cost: u64,
        call: F,
    ) -> TollgateResult<T>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let (value, reservation) = self.execute_deferred(policy, token_cost, call)?;
        consume_fixed(value, reservation)
    }

    /// Run `call` with retries but leave the reservation open.
    ///
    /// For calls whose usage arrives later, such as a stream that reports usage in
    /// its final event. Settle the returned [`Reservation`] once usage is known;
    /// dropping it releases the estimate in full.
    #[instrument(skip(self, policy, call))]
    pub fn execute_deferred<T, F>(
        &self,
        policy: &RetryPolicy,
        estimated_tokens: u64,
        mut call: F,
    ) -> TollgateResult<(T, Reservation<'_>)>
    where
        F: FnMut() -> Result<T, RemoteError>,
    {
        let mut backoff = Backoff::new(policy);
        loop {
            debug!(phase = %AttemptPhase::Acquiring, attempt = backoff.attempt());
            let reservation = self.reserve(estimated_tokens)?;

            debug!(phase = %AttemptPhase::Calling, attempt = backoff.attempt());
            match conclude(reservation, call(), &mut backoff)? {
                Ok(admitted) => return Ok(admitted),
                Err(delay) => std::thread::sleep(delay),
            }
        }
    }
}

impl AsyncRateLimiter {
    /// Run `call` under admission control, retrying rate-limit rejections.
    ///
    /// Same contract as [`RateLimiter::execute`], with waits and backoff expressed
    /// as task suspensions.
    pub async fn execute<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        estimated_tokens: u64,
        call: F,
    ) -> TollgateResult<T>
    where
        T: ReportsUsage,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let (response, reservation) = self
            .execute_deferred(policy, estimated_tokens, call)
            .await?;
        settle_usage(response, reservation)
    }

    /// Async counterpart of [`RateLimiter::execute_fixed`].
    pub async fn execute_fixed<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        token_cost: u64,
        call: F,
    ) -> TollgateResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let (value, reservation) = self.execute_deferred(policy, token_cost, call).await?;
        consume_fixed(value, reservation)
    }

    /// Async counterpart of [`RateLimiter::execute_deferred`].
    #[instrument(skip(self, policy, call))]
    pub async fn execute_deferred<T, F, Fut>(
        &self,
        policy: &RetryPolicy,
        estimated_tokens: u64,
        mut call: F,
    ) -> TollgateResult<(T, Reservation<'_>)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut backoff = Backoff::new(policy);
        loop {
            debug!(phase = %AttemptPhase::Acquiring, attempt = backoff.attempt());
            let reservation = self.reserve(estimated_tokens).await?;

            debug!(phase = %AttemptPhase::Calling, attempt = backoff.attempt());
            let outcome = call().await;
            match conclude(reservation, outcome, &mut backoff)? {
                Ok(admitted) => return Ok(admitted),
                Err(delay) => tokio::time::sleep(delay).await,
            }
        }
    }
}
