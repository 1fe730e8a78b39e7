//! Message and ConversationContext domain types.
//!
//! These are the core value objects of a turn:
//! User sends a message → Channel receives it → Manager resolves the
//! conversation → Dispatcher and Aggregator produce a reply → both are
//! appended to the conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a conversation between two correspondents.
///
/// Derived from the *unordered* pair of participant identifiers, so the
/// same two parties always land in the same conversation regardless of
/// who wrote first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Derive the conversation id for a pair of correspondents.
    ///
    /// The first identifier is length-prefixed, so identifiers that
    /// themselves contain `:` cannot collide with another pair.
    pub fn between(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{}:{first}:{second}", first.len()))
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// The human correspondent
    User,
    /// The simulated author persona
    Author,
    /// Operator or runtime notices
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Author => "author",
            Self::System => "system",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "author" => Ok(Self::Author),
            "system" => Ok(Self::System),
            other => Err(format!("unknown message kind '{other}'")),
        }
    }
}

/// A single message in a conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// The text content
    pub content: String,

    /// When the message was created
    pub timestamp: DateTime<Utc>,

    /// Who sent it
    pub sender_id: String,

    /// Who it is addressed to
    pub recipient_id: String,

    /// The conversation it belongs to
    pub conversation_id: ConversationId,

    pub kind: MessageKind,

    /// Optional metadata (transport info, provider info, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn new(
        kind: MessageKind,
        content: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        conversation_id: ConversationId,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            sender_id: sender_id.into(),
            recipient_id: recipient_id.into(),
            conversation_id,
            kind,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create an inbound user message. The conversation id is derived
    /// from the sender/recipient pair.
    pub fn user(
        content: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
    ) -> Self {
        let sender_id = sender_id.into();
        let recipient_id = recipient_id.into();
        let conversation_id = ConversationId::between(&sender_id, &recipient_id);
        Self::new(MessageKind::User, content, sender_id, recipient_id, conversation_id)
    }

    /// Create a reply spoken by the author persona.
    pub fn author(
        content: impl Into<String>,
        sender_id: impl Into<String>,
        recipient_id: impl Into<String>,
        conversation_id: ConversationId,
    ) -> Self {
        Self::new(MessageKind::Author, content, sender_id, recipient_id, conversation_id)
    }
}

/// The running history between one user and one author.
///
/// Messages are append-only and ordered oldest first. Owned by the
/// conversation manager; every other component only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub id: ConversationId,

    pub user_id: String,

    pub author_id: String,

    /// Ordered messages, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    /// Always `>= created_at`
    pub last_updated: DateTime<Utc>,

    /// Conversation-level metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ConversationContext {
    /// Create a new, empty conversation.
    pub fn new(
        id: ConversationId,
        user_id: impl Into<String>,
        author_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: user_id.into(),
            author_id: author_id.into(),
            messages: Vec::new(),
            created_at: now,
            last_updated: now,
            metadata: serde_json::Map::new(),
        }
    }

    /// Return the `n` most recent messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// The successor context after one turn: `user` then `reply` appended
    /// and `last_updated` strictly advanced.
    ///
    /// `self` is left untouched so a failed commit leaves nothing behind.
    pub fn with_turn(&self, user: Message, reply: Message) -> Self {
        let mut next = self.clone();
        next.messages.push(user);
        next.messages.push(reply);

        let now = Utc::now();
        next.last_updated = if now > self.last_updated {
            now
        } else {
            self.last_updated + chrono::Duration::microseconds(1)
        };
        next
    }
}
