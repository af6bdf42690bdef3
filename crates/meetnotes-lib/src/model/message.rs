// Messages serialize as plain `{"role": ..., "content": ...}` objects, which is
// both the chat-completions wire shape and the payload the token budget is
// measured against.
use serde::{Deserialize, Serialize};

/// Who authored a message in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// One conversational turn (or the system preamble).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Speaker-annotated user turn: `"<speaker>: <body>"`.
    pub fn from_speaker(speaker: &str, body: &str) -> Self {
        Self::user(format!("{speaker}: {body}"))
    }
}

/// Parsed turns in source order, earliest first.
pub type Conversation = Vec<Message>;
