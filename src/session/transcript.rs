use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One finalized transcript entry; immutable once created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            timestamp: Utc::now(),
        }
    }
}

/// Two-slot accumulator for in-flight partial transcripts.
///
/// Fragments grow the slots incrementally; a turn-complete signal drains
/// both transactionally into a user/assistant message pair, leaving the
/// buffer empty.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    user: String,
    assistant: String,
}

impl TurnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, fragment: &str) {
        self.user.push_str(fragment);
    }

    pub fn push_assistant(&mut self, fragment: &str) {
        self.assistant.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.assistant.is_empty()
    }

    /// Drain both slots into finalized messages, user first
    pub fn drain(&mut self) -> (ChatMessage, ChatMessage) {
        let user = ChatMessage::new(Role::User, std::mem::take(&mut self.user));
        let assistant = ChatMessage::new(Role::Assistant, std::mem::take(&mut self.assistant));
        (user, assistant)
    }
}
