//! Token cost estimation for outbound requests.
//!
//! The estimate is charged against the token bucket before the call is made and
//! reconciled against the real usage afterwards, so it should be conservative but
//! not wildly high. Counting follows the chat-completion convention: a fixed
//! overhead per message, one extra token per named participant, and two tokens
//! priming the reply.

use crate::{Content, ContentPart, Message};
use std::fmt;
use std::sync::Arc;
use tiktoken_rs::CoreBPE;
use tollgate_error::EstimationError;
use tracing::{debug, instrument};

const TOKENS_PER_MESSAGE: u64 = 4;
const TOKENS_PER_NAME: u64 = 1;
const REPLY_PRIMING_TOKENS: u64 = 2;
const MIN_RESPONSE_TOKENS: u64 = 50;
const CHARS_PER_TOKEN: u64 = 4;
/// Flat allowance per image part; the real cost depends on the model.
const IMAGE_PART_TOKENS: u64 = 85;

#[derive(Clone)]
enum Tokenizer {
    Bpe(Arc<CoreBPE>),
    Heuristic,
}

/// Deterministic token counter for conversation messages.
///
/// Two counting strategies are available: the `cl100k_base` BPE, which tracks
/// what chat APIs actually bill, and a character heuristic (`ceil(chars / 4)`)
/// that needs no tokenizer data.
///
/// # Examples
///
/// ```
/// use tollgate_core::{Message, TokenEstimator};
///
/// let estimator = TokenEstimator::heuristic();
/// let messages = vec![Message::user("abcdefgh")];
///
/// // 4 overhead + 2 content + 2 reply priming
/// assert_eq!(estimator.estimate(&messages), 8);
/// assert_eq!(estimator.estimate(&[]), 0);
/// ```
#[derive(Clone)]
pub struct TokenEstimator {
    tokenizer: Tokenizer,
}

impl TokenEstimator {
    /// Create an estimator backed by the `cl100k_base` encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoding cannot be loaded.
    #[instrument]
    pub fn cl100k() -> Result<Self, EstimationError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
            EstimationError::new(format!("Failed to load encoding 'cl100k_base': {}", e))
        })?;
        debug!("Loaded cl100k_base tokenizer");
        Ok(Self {
            tokenizer: Tokenizer::Bpe(Arc::new(bpe)),
        })
    }

    /// Create an estimator using the character heuristic.
    pub fn heuristic() -> Self {
        Self {
            tokenizer: Tokenizer::Heuristic,
        }
    }

    /// Count tokens in plain text.
    pub fn count_text(&self, text: &str) -> u64 {
        match &self.tokenizer {
            Tokenizer::Bpe(bpe) => bpe.encode_ordinary(text).len() as u64,
            Tokenizer::Heuristic => (text.chars().count() as u64).div_ceil(CHARS_PER_TOKEN),
        }
    }

    /// Count tokens in a message body. Image parts cost a flat 85 tokens.
    pub fn count_content(&self, content: &Content) -> u64 {
        match content {
            Content::Text(text) => self.count_text(text),
            Content::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => self.count_text(text),
                    ContentPart::ImageUrl { .. } => IMAGE_PART_TOKENS,
                })
                .sum(),
        }
    }

    /// Estimate the prompt tokens of a message sequence.
    ///
    /// An empty sequence costs nothing.
    pub fn estimate(&self, messages: &[Message]) -> u64 {
        if messages.is_empty() {
            return 0;
        }

        let content: u64 = messages
            .iter()
            .map(|message| {
                let name = if message.name.is_some() {
                    TOKENS_PER_NAME
                } else {
                    0
                };
                TOKENS_PER_MESSAGE + name + self.count_content(&message.content)
            })
            .sum();

        content + REPLY_PRIMING_TOKENS
    }

    /// Estimate completion tokens for a prompt of the given size.
    ///
    /// A quarter of the prompt, never less than 50.
    pub fn estimate_response(&self, prompt_tokens: u64) -> u64 {
        (prompt_tokens / 4).max(MIN_RESPONSE_TOKENS)
    }

    /// Estimate the full cost of a request: prompt plus expected completion.
    ///
    /// This is the amount reserved against the token bucket.
    pub fn estimate_request(&self, messages: &[Message]) -> u64 {
        let prompt = self.estimate(messages);
        let total = prompt + self.estimate_response(prompt);
        debug!(prompt, total, "Estimated request tokens");
        total
    }
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match self.tokenizer {
            Tokenizer::Bpe(_) => "cl100k_base",
            Tokenizer::Heuristic => "heuristic",
        };
        f.debug_struct("TokenEstimator")
            .field("tokenizer", &strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cl100k_counts_text() {
        let estimator = TokenEstimator::cl100k().expect("Failed to load tokenizer");
        let count = estimator.count_text("Hello, world!");
        assert!(count > 0);
        assert!(count < 10);
    }

    #[test]
    fn test_message_overhead() {
        let estimator = TokenEstimator::heuristic();
        let plain = vec![Message::user("")];
        let named = vec![Message::user("").with_name("bob")];
        assert_eq!(estimator.estimate(&plain), 6);
        assert_eq!(estimator.estimate(&named), 7);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let estimator = TokenEstimator::cl100k().expect("Failed to load tokenizer");
        let messages = vec![
            Message::system("You are terse."),
            Message::user("Summarise the plot of Hamlet in one line."),
        ];
        assert_eq!(estimator.estimate(&messages), estimator.estimate(&messages));
    }

    #[test]
    fn test_longer_text_never_counts_lower() {
        let estimator = TokenEstimator::heuristic();
        let mut text = String::new();
        let mut previous = estimator.estimate(&[Message::user(text.clone())]);
        for word in "the quick brown fox jumps over the lazy dog".split(' ') {
            text.push_str(word);
            text.push(' ');
            let current = estimator.estimate(&[Message::user(text.clone())]);
            assert!(current >= previous, "{} < {} for {:?}", current, previous, text);
            previous = current;
        }
    }

    #[test]
    fn test_image_parts_are_counted() {
        let estimator = TokenEstimator::heuristic();
        let message = Message::user(vec![
            ContentPart::text("abcdefgh"),
            ContentPart::image_url("https://example.com/cat.png"),
            ContentPart::image_url("https://example.com/dog.png"),
        ]);
        // 4 overhead + 2 text + 2 * 85 images + 2 priming
        assert_eq!(estimator.estimate(&[message]), 178);
    }

    #[test]
    fn test_response_allowance() {
        let estimator = TokenEstimator::heuristic();
        assert_eq!(estimator.estimate_response(0), 50);
        assert_eq!(estimator.estimate_response(100), 50);
        assert_eq!(estimator.estimate_response(1000), 250);
    }

    #[test]
    fn test_estimate_request_adds_response() {
        let estimator = TokenEstimator::heuristic();
        let messages = vec![Message::user("abcd")];
        // prompt = 4 + 1 + 2 = 7, response floor = 50
        assert_eq!(estimator.estimate_request(&messages), 57);
    }
}
