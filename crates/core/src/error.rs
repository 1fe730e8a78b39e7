//! Error types for the authorchat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them all.

use thiserror::Error;

/// The top-level error type for all authorchat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Conversation errors ---
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failure of a single call into the generation engine.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("Engine returned an empty completion for {0}")]
    EmptyCompletion(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

/// One content source that did not produce an answer for a turn.
///
/// Absorbed by the dispatcher; only surfaces inside
/// [`DispatchError::AllSourcesFailed`].
#[derive(Debug, Clone, Error)]
#[error("{title}: {reason}")]
pub struct SourceFailure {
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Author '{author}' has no content sources")]
    NoSources { author: String },

    #[error("All {} sources failed for author '{author}'", failures.len())]
    AllSourcesFailed {
        author: String,
        failures: Vec<SourceFailure>,
    },

    #[error("Failed to list sources: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Nothing to aggregate: no per-source responses")]
    NoResponses,

    #[error("Synthesis failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Synthesis timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Synthesized reply rejected: {reason}")]
    Rejected { reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// A whole turn failed. The stored conversation is left as it was.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("No author resolves from '{0}'")]
    UnknownAuthor(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn all_sources_failed_counts_failures() {
        let err = DispatchError::AllSourcesFailed {
            author: "Zizek".into(),
            failures: vec![
                SourceFailure {
                    title: "Book1".into(),
                    reason: "timed out after 2s".into(),
                },
                SourceFailure {
                    title: "Book2".into(),
                    reason: "rate limited".into(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("All 2 sources failed"));
        assert!(msg.contains("Zizek"));
    }

    #[test]
    fn conversation_error_is_transparent_over_dispatch() {
        let err: ConversationError = DispatchError::NoSources {
            author: "Nobody".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Author 'Nobody' has no content sources");
    }

    #[test]
    fn store_not_found_names_the_kind() {
        let err = StoreError::NotFound {
            kind: "conversation",
            id: "a:b".into(),
        };
        assert_eq!(err.to_string(), "conversation not found: a:b");
    }
}
