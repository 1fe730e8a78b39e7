//! GenerationEngine trait - per-source answers and final synthesis.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::message::ConversationContext;
use crate::source::{Author, ContentSource};

/// One candidate answer produced from a single content source.
///
/// Transient: produced by the dispatcher, consumed by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedResponse {
    /// Title of the source this answer was drawn from
    pub source_title: String,

    /// The generated text
    pub content: String,

    /// Engine-defined score; opaque, not a ranking signal
    #[serde(default)]
    pub confidence: f32,

    pub generated_at: DateTime<Utc>,

    /// Engine-specific metadata (model, token usage)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl GeneratedResponse {
    pub fn new(source_title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_title: source_title.into(),
            content: content.into(),
            confidence: 0.0,
            generated_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// The text-generation capability the pipeline depends on.
#[async_trait]
pub trait GenerationEngine: Send + Sync {
    /// A human-readable name for logs.
    fn name(&self) -> &str;

    /// Answer `query` from a single source, given the conversation so far.
    async fn answer(
        &self,
        author: &Author,
        source: &ContentSource,
        context: &ConversationContext,
        query: &str,
    ) -> Result<GeneratedResponse, GenerationError>;

    /// Merge per-source answers into one reply in the author's voice.
    async fn synthesize(
        &self,
        author: &Author,
        responses: &[GeneratedResponse],
        query: &str,
    ) -> Result<String, GenerationError>;
}
