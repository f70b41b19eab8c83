use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AnswerMode;

pub const GREETING: &str = "Hi, I'm a chatbot who can chat with the PDF. How can I help you?";

/// In-memory history of one chat session.
///
/// Append-only: messages can be pushed and read, never edited or removed.
/// A new state always opens with the assistant greeting.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    id: Uuid,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            messages: vec![Message::new(MessageRole::Assistant, Avatar::Llm, GREETING)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new(MessageRole::User, Avatar::User, content))
    }

    pub fn push_answer(&mut self, mode: AnswerMode, content: impl Into<String>) -> &Message {
        self.push(Message::new(
            MessageRole::Assistant,
            Avatar::for_mode(mode),
            content,
        ))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.updated_at = message.created_at;
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, MessageRole::User))
            .map(|m| m.content.as_str())
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub avatar: Avatar,
    /// Emoji shown next to the message in the chat page.
    pub marker: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(role: MessageRole, avatar: Avatar, content: impl Into<String>) -> Self {
        Self {
            role,
            avatar,
            marker: avatar.marker().to_string(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Who a message is shown as: the user, a grounded answer, or a plain model answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Avatar {
    User,
    Rag,
    Llm,
}

impl Avatar {
    pub fn for_mode(mode: AnswerMode) -> Self {
        match mode {
            AnswerMode::Grounded => Self::Rag,
            AnswerMode::Ungrounded => Self::Llm,
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            Self::User => "👤",
            Self::Rag => "📚",
            Self::Llm => "🤖",
        }
    }
}
