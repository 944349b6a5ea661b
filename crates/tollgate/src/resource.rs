//! Auxiliary conversation and agent calls with fixed token costs.
//!
//! These endpoints report no usage, so each is charged a flat amount against the
//! token bucket and the charge is never refunded.

use serde::{Deserialize, Serialize};

/// Cost of a lookup or listing.
pub const LOOKUP_TOKENS: u64 = 50;
/// Cost of creating or updating an agent.
pub const AGENT_WRITE_TOKENS: u64 = 100;
/// Cost of a deletion.
pub const DELETE_TOKENS: u64 = 10;

/// A conversation or agent management call.
///
/// # Examples
///
/// ```
/// use tollgate::ResourceAction;
///
/// let action = ResourceAction::GetHistory {
///     conversation_id: "conv-1".to_string(),
/// };
/// assert_eq!(action.token_cost(), 50);
/// assert_eq!(action.to_string(), "get_history");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_more::Display)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResourceAction {
    /// Fetch one conversation's metadata
    #[display("get_conversation")]
    GetConversation {
        /// Conversation to fetch
        conversation_id: String,
    },
    /// Fetch every entry of a conversation
    #[display("get_history")]
    GetHistory {
        /// Conversation to fetch
        conversation_id: String,
    },
    /// Fetch the messages of a conversation
    #[display("get_messages")]
    GetMessages {
        /// Conversation to fetch
        conversation_id: String,
    },
    /// List conversations, one page at a time
    #[display("list_conversations")]
    ListConversations {
        /// Zero-based page index
        page: u32,
        /// Conversations per page
        page_size: u32,
    },
    /// Delete a conversation
    #[display("delete_conversation")]
    DeleteConversation {
        /// Conversation to delete
        conversation_id: String,
    },
    /// List agents, one page at a time
    #[display("list_agents")]
    ListAgents {
        /// Zero-based page index
        page: u32,
        /// Agents per page
        page_size: u32,
    },
    /// Fetch one agent
    #[display("get_agent")]
    GetAgent {
        /// Agent to fetch
        agent_id: String,
    },
    /// Create an agent from a definition
    #[display("create_agent")]
    CreateAgent {
        /// Model, name, instructions, and tools of the new agent
        definition: serde_json::Value,
    },
    /// Change fields of an existing agent
    #[display("update_agent")]
    UpdateAgent {
        /// Agent to change
        agent_id: String,
        /// Fields to overwrite
        changes: serde_json::Value,
    },
    /// Delete an agent
    #[display("delete_agent")]
    DeleteAgent {
        /// Agent to delete
        agent_id: String,
    },
}

impl ResourceAction {
    /// Tokens charged for this call.
    pub fn token_cost(&self) -> u64 {
        match self {
            Self::GetConversation { .. }
            | Self::GetHistory { .. }
            | Self::GetMessages { .. }
            | Self::ListConversations { .. }
            | Self::ListAgents { .. }
            | Self::GetAgent { .. } => LOOKUP_TOKENS,
            Self::CreateAgent { .. } | Self::UpdateAgent { .. } => AGENT_WRITE_TOKENS,
            Self::DeleteConversation { .. } | Self::DeleteAgent { .. } => DELETE_TOKENS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_costs_by_kind() {
        let listing = ResourceAction::ListConversations {
            page: 0,
            page_size: 100,
        };
        let update = ResourceAction::UpdateAgent {
            agent_id: "ag-1".to_string(),
            changes: serde_json::json!({"name": "renamed"}),
        };
        let delete = ResourceAction::DeleteConversation {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(listing.token_cost(), 50);
        assert_eq!(update.token_cost(), 100);
        assert_eq!(delete.token_cost(), 10);
    }

    #[test]
    fn test_wire_shape() {
        let action = ResourceAction::GetAgent {
            agent_id: "ag-1".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({"action": "get_agent", "agent_id": "ag-1"})
        );
    }
}
