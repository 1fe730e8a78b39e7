//! In-memory backend - useful for testing and ephemeral sessions.

use async_trait::async_trait;
use authorchat_core::error::StoreError;
use authorchat_core::message::{ConversationContext, ConversationId, Message};
use authorchat_core::source::{Author, ContentSource};
use authorchat_core::store::{ContentSourceStore, ConversationStore};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::Catalog;

#[derive(Default)]
struct State {
    /// Authors without their sources
    authors: Vec<Author>,
    /// Sources in provisioning order
    sources: Vec<ContentSource>,
    conversations: HashMap<ConversationId, ConversationContext>,
    messages: Vec<Message>,
}

impl State {
    fn author_with_sources(&self, author: &Author) -> Author {
        let mut author = author.clone();
        author.sources = self
            .sources
            .iter()
            .filter(|s| s.author == author.name)
            .cloned()
            .collect();
        author
    }
}

/// An in-memory backend. Nothing survives the process.
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Seed an author and its `sources` (builder style, for tests and demos).
    pub fn with_author(mut self, author: Author) -> Self {
        let state = self.state.get_mut();
        state.sources.retain(|s| s.author != author.name);
        state.sources.extend(author.sources.iter().cloned());
        state.authors.retain(|a| a.name != author.name);
        state.authors.push(Author {
            sources: Vec::new(),
            ..author
        });
        self
    }

    /// Every message ever appended, in append order.
    pub async fn message_log(&self) -> Vec<Message> {
        self.state.read().await.messages.clone()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentSourceStore for InMemoryStore {
    async fn list_sources(&self, author: &str) -> Result<Vec<ContentSource>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .sources
            .iter()
            .filter(|s| s.author == author)
            .cloned()
            .collect())
    }

    async fn get_author(&self, identifier: &str) -> Result<Option<Author>, StoreError> {
        let state = self.state.read().await;
        let found = state
            .authors
            .iter()
            .find(|a| a.name == identifier)
            .or_else(|| state.authors.iter().find(|a| a.answers_to(identifier)));
        Ok(found.map(Author::profile))
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<ConversationContext>, StoreError> {
        Ok(self.state.read().await.conversations.get(id).cloned())
    }

    async fn create(&self, context: &ConversationContext) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .conversations
            .entry(context.id.clone())
            .or_insert_with(|| context.clone());
        Ok(())
    }

    async fn replace(&self, context: &ConversationContext) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.conversations.get_mut(&context.id) {
            Some(stored) => {
                *stored = context.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                kind: "conversation",
                id: context.id.to_string(),
            }),
        }
    }

    async fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.state.write().await.messages.push(message.clone());
        Ok(())
    }

    async fn commit_turn(
        &self,
        context: &ConversationContext,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&context.id) {
            return Err(StoreError::NotFound {
                kind: "conversation",
                id: context.id.to_string(),
            });
        }
        state.messages.extend(messages.iter().cloned());
        state.conversations.insert(context.id.clone(), context.clone());
        Ok(())
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn upsert_author(&self, author: &Author) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = Author {
            sources: Vec::new(),
            ..author.clone()
        };
        match state.authors.iter_mut().find(|a| a.name == author.name) {
            Some(existing) => *existing = record,
            None => state.authors.push(record),
        }
        Ok(())
    }

    async fn upsert_source(&self, source: &ContentSource) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.authors.iter().any(|a| a.name == source.author) {
            return Err(StoreError::NotFound {
                kind: "author",
                id: source.author.clone(),
            });
        }
        match state
            .sources
            .iter_mut()
            .find(|s| s.author == source.author && s.title == source.title)
        {
            Some(existing) => *existing = source.clone(),
            None => state.sources.push(source.clone()),
        }
        Ok(())
    }

    async fn list_authors(&self) -> Result<Vec<Author>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .authors
            .iter()
            .map(|a| state.author_with_sources(a))
            .collect())
    }
}
