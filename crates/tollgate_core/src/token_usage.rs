//! Token usage reported by the remote API.

use serde::{Deserialize, Serialize};

/// Token usage statistics for a single remote call.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_getters::Getters,
)]
pub struct TokenUsage {
    /// Tokens in the prompt/input.
    prompt_tokens: u64,
    /// Tokens in the response/output.
    completion_tokens: u64,
}

impl TokenUsage {
    /// Create a new token usage record.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    /// Total tokens (prompt + completion).
    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Responses that know how many tokens the remote actually charged.
///
/// The retry wrapper uses this to settle a reservation after a successful call.
pub trait ReportsUsage {
    /// Actual tokens consumed by the call.
    fn tokens_used(&self) -> u64;
}

impl ReportsUsage for TokenUsage {
    fn tokens_used(&self) -> u64 {
        self.total_tokens()
    }
}
