//! Synthesis of per-book answers into one reply.

use std::sync::Arc;
use std::time::Duration;

use authorchat_config::ProcessingConfig;
use authorchat_core::engine::{GeneratedResponse, GenerationEngine};
use authorchat_core::error::AggregationError;
use authorchat_core::source::Author;
use tracing::{info, warn};

/// Merges the answers of one turn into a single reply.
///
/// No retry, and no falling back to a single book's answer.
pub struct Aggregator {
    engine: Arc<dyn GenerationEngine>,
    timeout: Duration,
    min_reply_chars: usize,
    max_reply_chars: usize,
}

impl Aggregator {
    pub fn new(engine: Arc<dyn GenerationEngine>, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            min_reply_chars: 10,
            max_reply_chars: 1000,
        }
    }

    pub fn from_config(engine: Arc<dyn GenerationEngine>, config: &ProcessingConfig) -> Self {
        Self::new(engine, config.aggregation_timeout())
            .with_reply_bounds(config.min_reply_chars, config.max_reply_chars)
    }

    pub fn with_reply_bounds(mut self, min_chars: usize, max_chars: usize) -> Self {
        self.min_reply_chars = min_chars;
        self.max_reply_chars = max_chars;
        self
    }

    /// Produce the reply for `query` from `responses`.
    ///
    /// The returned text is trimmed.
    pub async fn aggregate(
        &self,
        author: &Author,
        responses: &[GeneratedResponse],
        query: &str,
    ) -> Result<String, AggregationError> {
        if responses.is_empty() {
            return Err(AggregationError::NoResponses);
        }

        let synthesis = self.engine.synthesize(author, responses, query);
        let reply = tokio::time::timeout(self.timeout, synthesis)
            .await
            .map_err(|_| AggregationError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        let reply = reply.trim();
        let chars = reply.chars().count();
        if chars < self.min_reply_chars {
            warn!(chars, min = self.min_reply_chars, "Synthesized reply too short");
            return Err(AggregationError::Rejected {
                reason: format!(
                    "reply has {chars} characters, fewer than {}",
                    self.min_reply_chars
                ),
            });
        }
        if chars > self.max_reply_chars {
            warn!(chars, max = self.max_reply_chars, "Synthesized reply too long");
            return Err(AggregationError::Rejected {
                reason: format!("reply has {chars} characters, more than {}", self.max_reply_chars),
            });
        }

        info!(author = %author.name, sources = responses.len(), chars, "Reply synthesized");
        Ok(reply.to_string())
    }
}
