//! Storage capability traits.
//!
//! Implementations: SQLite (production) and in-memory (tests, ephemeral
//! runs), both in `authorchat-store`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{ConversationContext, ConversationId, Message};
use crate::source::{Author, ContentSource};

/// Read access to authors and their books.
#[async_trait]
pub trait ContentSourceStore: Send + Sync {
    /// All sources owned by `author`, in provisioning order.
    async fn list_sources(&self, author: &str) -> Result<Vec<ContentSource>, StoreError>;

    /// Look up an author by name or contact address. `sources` is left
    /// empty; book text is read through `list_sources`.
    async fn get_author(&self, identifier: &str) -> Result<Option<Author>, StoreError>;
}

/// Persistence for conversations and their messages.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    async fn get(&self, id: &ConversationId) -> Result<Option<ConversationContext>, StoreError>;

    /// Insert if absent. A duplicate id is not an error and leaves the
    /// stored context untouched.
    async fn create(&self, context: &ConversationContext) -> Result<(), StoreError>;

    /// Overwrite an existing context. Fails with `NotFound` for an unknown id.
    async fn replace(&self, context: &ConversationContext) -> Result<(), StoreError>;

    /// Record one message in the message log.
    async fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Persist one finished turn: every message in `messages` and the
    /// updated context, together or not at all. A failed commit leaves
    /// both the message log and the stored context as they were.
    async fn commit_turn(
        &self,
        context: &ConversationContext,
        messages: &[Message],
    ) -> Result<(), StoreError>;
}
