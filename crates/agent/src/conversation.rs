//! Conversation lifecycle: resolve, dispatch, aggregate, commit.
//!
//! A conversation is created on its first message and only ever grows.
//! Turns on the same conversation run one at a time; turns on different
//! conversations run in parallel. A failed turn writes nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use authorchat_config::ProcessingConfig;
use authorchat_core::engine::GenerationEngine;
use authorchat_core::error::{ConversationError, StoreError};
use authorchat_core::message::{ConversationContext, ConversationId, Message};
use authorchat_core::source::Author;
use authorchat_core::store::{ContentSourceStore, ConversationStore};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{Instrument, Span, debug, field, info, info_span};

use crate::aggregator::Aggregator;
use crate::dispatcher::Dispatcher;

type LockMap = Arc<Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>>;

/// One async mutex per conversation with a turn in flight.
#[derive(Default)]
pub struct TurnLocks {
    locks: LockMap,
}

/// Held for the duration of one turn.
pub struct TurnGuard {
    id: ConversationId,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other turn holds `id`, then hold it.
    pub async fn acquire(&self, id: &ConversationId) -> TurnGuard {
        let lock = {
            let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(id.clone()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        TurnGuard {
            id: id.clone(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Conversations with a turn running or waiting.
    pub fn active(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map still refers to it: nobody holds or awaits this lock
        if map.get(&self.id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&self.id);
        }
    }
}

/// Owns conversation state and drives each turn.
pub struct ConversationManager {
    sources: Arc<dyn ContentSourceStore>,
    conversations: Arc<dyn ConversationStore>,
    dispatcher: Dispatcher,
    aggregator: Aggregator,
    default_author: Option<String>,
    locks: TurnLocks,
}

impl ConversationManager {
    pub fn new(
        sources: Arc<dyn ContentSourceStore>,
        conversations: Arc<dyn ConversationStore>,
        engine: Arc<dyn GenerationEngine>,
        config: &ProcessingConfig,
    ) -> Self {
        Self {
            dispatcher: Dispatcher::from_config(sources.clone(), engine.clone(), config),
            aggregator: Aggregator::from_config(engine, config),
            sources,
            conversations,
            default_author: config.default_author.clone(),
            locks: TurnLocks::new(),
        }
    }

    /// Fetch the conversation, creating an empty one if absent.
    ///
    /// Always returns what the store holds, so concurrent first messages
    /// agree on a single context.
    pub async fn get_or_create(
        &self,
        id: &ConversationId,
        user_id: &str,
        author_id: &str,
    ) -> Result<ConversationContext, StoreError> {
        if let Some(context) = self.conversations.get(id).await? {
            return Ok(context);
        }

        let fresh = ConversationContext::new(id.clone(), user_id, author_id);
        self.conversations.create(&fresh).await?;
        debug!(conversation_id = %id, "Conversation created");

        self.conversations.get(id).await?.ok_or_else(|| StoreError::NotFound {
            kind: "conversation",
            id: id.to_string(),
        })
    }

    /// Run one full turn for an inbound user message and return the reply.
    pub async fn process_message(&self, message: &Message) -> Result<String, ConversationError> {
        let span = info_span!(
            "turn",
            conversation_id = %message.conversation_id,
            author = field::Empty,
        );

        async move {
            let _turn = self.locks.acquire(&message.conversation_id).await;

            let author = self.resolve_author(&message.recipient_id).await?;
            Span::current().record("author", author.name.as_str());

            let context = self
                .get_or_create(&message.conversation_id, &message.sender_id, &author.name)
                .await?;

            let responses = self.dispatcher.dispatch(&message.content, &author, &context).await?;
            let reply = self.aggregator.aggregate(&author, &responses, &message.content).await?;

            let updated = self.update_context(&context, message, &reply).await?;
            info!(messages = updated.messages.len(), "Turn complete");
            Ok(reply)
        }
        .instrument(span)
        .await
    }

    /// Append the user message and the reply to `context` and persist the
    /// result in one commit. `context` itself is not modified.
    pub async fn update_context(
        &self,
        context: &ConversationContext,
        message: &Message,
        reply: &str,
    ) -> Result<ConversationContext, StoreError> {
        let reply = Message::author(
            reply,
            &message.recipient_id,
            &message.sender_id,
            context.id.clone(),
        );
        let updated = context.with_turn(message.clone(), reply.clone());

        self.conversations
            .commit_turn(&updated, &[message.clone(), reply])
            .await?;
        Ok(updated)
    }

    /// Find the author addressed by `identifier`, or the configured default.
    pub async fn resolve_author(&self, identifier: &str) -> Result<Author, ConversationError> {
        if let Some(author) = self.sources.get_author(identifier).await? {
            return Ok(author);
        }
        if let Some(default) = &self.default_author {
            if let Some(author) = self.sources.get_author(default).await? {
                debug!(identifier, author = %author.name, "Falling back to default author");
                return Ok(author);
            }
        }
        Err(ConversationError::UnknownAuthor(identifier.to_string()))
    }

    /// Conversations with a turn running or waiting.
    pub fn active_turns(&self) -> usize {
        self.locks.active()
    }
}
