//! Conversation request and response types.

use serde::{Deserialize, Serialize};
use tollgate_core::{Message, ReportsUsage, TokenUsage};

/// Which conversation endpoint a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConversationAction {
    /// Open a new conversation
    #[display("start")]
    Start,
    /// Add entries to an existing conversation
    #[display("append")]
    Append {
        /// Conversation to continue
        conversation_id: String,
    },
    /// Branch an existing conversation from an earlier entry
    #[display("restart")]
    Restart {
        /// Conversation to branch
        conversation_id: String,
        /// Entry the new branch starts after
        from_entry_id: String,
    },
}

/// Payload sent with every conversation action.
///
/// # Examples
///
/// ```
/// use tollgate::{ConversationRequest, Message};
///
/// let request = ConversationRequest::new(vec![Message::user("Summarize this")])
///     .with_model("small-latest")
///     .with_instructions("Answer in one sentence.");
///
/// // instructions are sent (and counted) as a leading system message
/// assert_eq!(request.prompt_messages().len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequest {
    /// New conversation entries
    pub inputs: Vec<Message>,
    /// Model to run, if not the remote default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// System-level instructions for the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl ConversationRequest {
    /// Create a request from input messages.
    pub fn new(inputs: Vec<Message>) -> Self {
        Self {
            inputs,
            ..Self::default()
        }
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the instructions.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Every message the remote will read for this request, in order.
    pub fn prompt_messages(&self) -> Vec<Message> {
        self.instructions
            .iter()
            .map(|instructions| Message::system(instructions.as_str()))
            .chain(self.inputs.iter().cloned())
            .collect()
    }
}

/// Remote answer to a conversation action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Conversation the outputs belong to
    pub conversation_id: String,
    /// Entries produced by the remote
    pub outputs: Vec<Message>,
    /// Usage billed by the remote
    pub usage: TokenUsage,
}

impl ReportsUsage for ConversationResponse {
    fn tokens_used(&self) -> u64 {
        self.usage.total_tokens()
    }
}

/// One server-sent event of a streamed conversation action.
///
/// Only the terminal `conversation.response.done` event carries usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationEvent {
    /// The remote accepted the action
    #[serde(rename = "conversation.response.started")]
    Started {
        /// Conversation the following deltas belong to
        conversation_id: String,
    },
    /// A fragment of assistant output
    #[serde(rename = "message.output.delta")]
    OutputDelta {
        /// Text to append to the output so far
        content: String,
    },
    /// The response is complete
    #[serde(rename = "conversation.response.done")]
    Done {
        /// Usage billed for the whole stream
        usage: TokenUsage,
    },
}

impl ConversationEvent {
    /// Usage reported by this event, if it is the terminal one.
    pub fn usage(&self) -> Option<&TokenUsage> {
        match self {
            Self::Done { usage } => Some(usage),
            _ => None,
        }
    }
}
