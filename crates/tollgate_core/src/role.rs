//! Role types for conversation participants.

use serde::{Deserialize, Serialize};

/// Author of a conversation message.
///
/// # Examples
///
/// ```
/// use tollgate_core::Role;
///
/// assert_ne!(Role::User, Role::Assistant);
/// assert_eq!(format!("{}", Role::System), "system");
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System messages provide context and instructions
    #[display("system")]
    System,
    /// User messages are from the human
    #[display("user")]
    User,
    /// Assistant messages are from the AI
    #[display("assistant")]
    Assistant,
    /// Tool results fed back into the conversation
    #[display("tool")]
    Tool,
}
