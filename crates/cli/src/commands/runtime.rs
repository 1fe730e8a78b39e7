//! Assemble the turn pipeline from configuration.

use std::sync::Arc;

use authorchat_agent::{ConversationManager, LlmEngine};
use authorchat_config::AppConfig;
use authorchat_store::Stores;
use tracing::info;

/// Everything a command needs to run turns.
pub struct Runtime {
    pub manager: Arc<ConversationManager>,
    pub stores: Stores,
}

/// Open the store, build the provider and wire the conversation manager.
pub async fn build(config: &AppConfig) -> Result<Runtime, Box<dyn std::error::Error>> {
    let router = authorchat_providers::build_from_config(config)?;
    let provider = router.default_provider().ok_or("No default provider configured")?;

    let engine = Arc::new(
        LlmEngine::from_config(provider, &config.llm)
            .with_reply_limit(config.processing.max_reply_chars),
    );
    let stores = authorchat_store::open(&config.store).await?;
    let manager = Arc::new(ConversationManager::new(
        stores.sources.clone(),
        stores.conversations.clone(),
        engine,
        &config.processing,
    ));

    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        store = stores.conversations.name(),
        "Pipeline ready"
    );
    Ok(Runtime { manager, stores })
}

/// The author to talk to: the flag, else `processing.default_author`.
pub fn author_or_default(
    config: &AppConfig,
    author: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    author
        .or_else(|| config.processing.default_author.clone())
        .ok_or_else(|| "No author given; pass --author or set processing.default_author".into())
}
