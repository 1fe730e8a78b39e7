//! The LLM-backed generation engine.
//!
//! Builds two kinds of prompt and sends them through a [`Provider`]:
//! a per-book prompt (persona, one book's full text, recent history, the
//! query) and a synthesis prompt (every per-book answer plus the query).

use std::sync::Arc;

use async_trait::async_trait;
use authorchat_config::LlmConfig;
use authorchat_core::engine::{GeneratedResponse, GenerationEngine};
use authorchat_core::error::GenerationError;
use authorchat_core::message::{ConversationContext, MessageKind};
use authorchat_core::provider::{ChatMessage, Provider, ProviderRequest};
use authorchat_core::source::{Author, ContentSource};
use tracing::debug;

/// A [`GenerationEngine`] that talks to an LLM provider.
pub struct LlmEngine {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    /// Messages of history included in a per-book prompt
    history_window: usize,
    /// Length ceiling stated in the synthesis prompt
    reply_limit: Option<usize>,
}

impl LlmEngine {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            history_window: 5,
            reply_limit: None,
        }
    }

    pub fn from_config(provider: Arc<dyn Provider>, config: &LlmConfig) -> Self {
        Self::new(provider, &config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_history_window(config.history_window)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_reply_limit(mut self, max_chars: usize) -> Self {
        self.reply_limit = Some(max_chars);
        self
    }

    fn persona(author: &Author) -> String {
        let mut persona = format!(
            "You are helping to simulate a conversation with {}.",
            author.name
        );
        if let Some(bio) = &author.bio {
            persona.push_str(&format!("\n\nAbout the author:\n{bio}"));
        }
        if let Some(style) = author.style_text() {
            persona.push_str(&format!("\n\nConversation style:\n{style}"));
        }
        persona
    }

    fn answer_prompt(
        &self,
        author: &Author,
        source: &ContentSource,
        context: &ConversationContext,
        query: &str,
    ) -> Vec<ChatMessage> {
        let history = context
            .recent(self.history_window)
            .iter()
            .map(|m| {
                let speaker = match m.kind {
                    MessageKind::User => "User",
                    MessageKind::Author => author.name.as_str(),
                    MessageKind::System => "System",
                };
                format!("{speaker}: {}", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n");
        let history = if history.is_empty() {
            "(none)".to_string()
        } else {
            history
        };

        let title = match source.publication_year {
            Some(year) => format!("{} ({year})", source.title),
            None => source.title.clone(),
        };

        let prompt = format!(
            "Book: {title}\n\n\
            Book Content:\n{content}\n\n\
            Previous Conversation:\n{history}\n\n\
            Current Query:\n{query}\n\n\
            Generate a response in the style of {name} based on the ideas present in this specific book.",
            content = source.content,
            name = author.name,
        );

        vec![ChatMessage::system(Self::persona(author)), ChatMessage::user(prompt)]
    }

    fn synthesis_prompt(
        &self,
        author: &Author,
        responses: &[GeneratedResponse],
        query: &str,
    ) -> Vec<ChatMessage> {
        let formatted = responses
            .iter()
            .map(|r| format!("From {}:\n{}", r.source_title, r.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut prompt = format!(
            "The following are different responses to the query: \"{query}\"\n\
            Each response is generated based on a different book by {name}.\n\n\
            {formatted}\n\n\
            Please synthesize these responses into a single, coherent response that:\n\
            1. Captures the key ideas from all relevant books\n\
            2. Maintains the author's voice and style\n\
            3. Presents a unified perspective\n\
            4. Explicitly mentions relevant books when appropriate",
            name = author.name,
        );
        if let Some(limit) = self.reply_limit {
            prompt.push_str(&format!(
                "\n5. Stays under {limit} characters, as it will be sent as a chat message"
            ));
        }
        prompt.push_str("\n\nSynthesized response:");

        vec![ChatMessage::system(Self::persona(author)), ChatMessage::user(prompt)]
    }

    async fn send(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<(String, serde_json::Map<String, serde_json::Value>), GenerationError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let response = self.provider.complete(request).await?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("model".into(), serde_json::json!(response.model));
        if let Some(usage) = &response.usage {
            metadata.insert("total_tokens".into(), serde_json::json!(usage.total_tokens));
        }
        Ok((response.content, metadata))
    }
}

#[async_trait]
impl GenerationEngine for LlmEngine {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn answer(
        &self,
        author: &Author,
        source: &ContentSource,
        context: &ConversationContext,
        query: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        let messages = self.answer_prompt(author, source, context, query);
        debug!(title = %source.title, model = %self.model, "Requesting per-book answer");

        let (content, metadata) = self.send(messages).await?;
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion(source.title.clone()));
        }

        let mut response = GeneratedResponse::new(&source.title, content);
        response.metadata = metadata;
        Ok(response)
    }

    async fn synthesize(
        &self,
        author: &Author,
        responses: &[GeneratedResponse],
        query: &str,
    ) -> Result<String, GenerationError> {
        let messages = self.synthesis_prompt(author, responses, query);
        debug!(responses = responses.len(), model = %self.model, "Requesting synthesis");

        let (content, _) = self.send(messages).await?;
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyCompletion("synthesis".into()));
        }
        Ok(content)
    }
}
