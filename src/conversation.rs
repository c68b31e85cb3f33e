//! Conversation and request-context types shared by all pipes.
//!
//! The conversation is owned by the chat-UI host; a pipe reads the last
//! entry and appends at most one assistant reply per invocation. The
//! [`RequestContext`] carries host identifiers as an explicit, typed
//! parameter instead of leaving them to be dug out of callback state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message.
    System,
    /// Human user message.
    User,
    /// Assistant (agent) message.
    Assistant,
}

/// A single role/content entry in the conversation transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// Plain text content.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The running conversation transcript, owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Ordered role/content message pairs.
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Build a conversation from a list of messages.
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    /// Build a conversation holding a single user message.
    pub fn from_user_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(text)],
        }
    }

    /// Content of the latest entry, which the pipes treat as the
    /// pending user message. `None` when the transcript is empty.
    pub fn latest_text(&self) -> Option<&str> {
        self.messages.last().map(|m| m.content.as_str())
    }

    /// Append an assistant reply to the transcript.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }
}

/// Optional host-supplied identity of the requesting user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Host-side user identifier.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Host-side role (e.g. "admin", "user").
    pub role: Option<String>,
}

/// Explicit per-invocation context threaded into a pipe call.
///
/// Carries the identifiers the host previously smuggled through callback
/// closures, plus a generated request id used for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique id for this invocation, generated at construction.
    pub request_id: Uuid,
    /// Host conversation identifier, when known.
    pub chat_id: Option<String>,
    /// Host message identifier, when known.
    pub message_id: Option<String>,
    /// Requesting user, when supplied by the host.
    pub user: Option<UserInfo>,
}

impl RequestContext {
    /// Create a context with a fresh request id and no host identifiers.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            chat_id: None,
            message_id: None,
            user: None,
        }
    }

    /// Attach the host conversation and message identifiers.
    pub fn with_chat(mut self, chat_id: impl Into<String>, message_id: Option<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self.message_id = message_id;
        self
    }

    /// Attach the requesting user's identity.
    pub fn with_user(mut self, user: UserInfo) -> Self {
        self.user = Some(user);
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
