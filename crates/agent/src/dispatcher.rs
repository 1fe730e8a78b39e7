//! Per-book fan-out.
//!
//! Every book of the author is asked the same query concurrently, bounded
//! by a semaphore. Each book gets its own timeout once it holds a permit.
//! A book that times out, errors or panics is logged and dropped; the turn
//! only fails when no book answers at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use authorchat_config::ProcessingConfig;
use authorchat_core::engine::{GeneratedResponse, GenerationEngine};
use authorchat_core::error::{DispatchError, SourceFailure};
use authorchat_core::message::ConversationContext;
use authorchat_core::source::Author;
use authorchat_core::store::ContentSourceStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

/// Fans a query out across an author's books.
pub struct Dispatcher {
    sources: Arc<dyn ContentSourceStore>,
    engine: Arc<dyn GenerationEngine>,
    max_concurrent: usize,
    response_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        sources: Arc<dyn ContentSourceStore>,
        engine: Arc<dyn GenerationEngine>,
        max_concurrent: usize,
        response_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            engine,
            max_concurrent: max_concurrent.max(1),
            response_timeout,
        }
    }

    pub fn from_config(
        sources: Arc<dyn ContentSourceStore>,
        engine: Arc<dyn GenerationEngine>,
        config: &ProcessingConfig,
    ) -> Self {
        Self::new(
            sources,
            engine,
            config.max_concurrent_sources,
            config.response_timeout(),
        )
    }

    /// Ask every book of `author` for an answer to `query`.
    ///
    /// Returns the successful answers in completion order.
    pub async fn dispatch(
        &self,
        query: &str,
        author: &Author,
        context: &ConversationContext,
    ) -> Result<Vec<GeneratedResponse>, DispatchError> {
        let sources = self.sources.list_sources(&author.name).await?;
        if sources.is_empty() {
            warn!(author = %author.name, "No books found for author");
            return Err(DispatchError::NoSources {
                author: author.name.clone(),
            });
        }

        let total = sources.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let author_arc = Arc::new(author.profile());
        let context = Arc::new(context.clone());
        let query: Arc<str> = Arc::from(query);
        let timeout = self.response_timeout;

        let mut set = JoinSet::new();
        let mut titles = HashMap::with_capacity(total);

        for source in sources {
            let title = source.title.clone();
            let span = info_span!("source", author = %author.name, title = %title);
            let semaphore = semaphore.clone();
            let engine = self.engine.clone();
            let author = author_arc.clone();
            let context = context.clone();
            let query = query.clone();

            let handle = set.spawn(
                async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| SourceFailure {
                        title: source.title.clone(),
                        reason: format!("concurrency limiter closed: {e}"),
                    })?;

                    let answer = engine.answer(&author, &source, &context, &query);
                    let outcome = tokio::time::timeout(timeout, answer).await;
                    match outcome {
                        Ok(Ok(response)) => {
                            debug!("Book answered");
                            Ok(response)
                        }
                        Ok(Err(e)) => Err(SourceFailure {
                            title: source.title,
                            reason: e.to_string(),
                        }),
                        Err(_) => Err(SourceFailure {
                            title: source.title,
                            reason: format!("timed out after {}s", timeout.as_secs_f64()),
                        }),
                    }
                }
                .instrument(span),
            );
            titles.insert(handle.id(), title);
        }

        let mut responses = Vec::with_capacity(total);
        let mut failures = Vec::new();

        while let Some(joined) = set.join_next_with_id().await {
            let failure = match joined {
                Ok((_, Ok(response))) => {
                    responses.push(response);
                    continue;
                }
                Ok((_, Err(failure))) => failure,
                Err(e) => SourceFailure {
                    title: titles.get(&e.id()).cloned().unwrap_or_default(),
                    reason: if e.is_panic() {
                        "generation task panicked".into()
                    } else {
                        format!("generation task failed: {e}")
                    },
                },
            };
            warn!(
                author = %author.name,
                title = %failure.title,
                reason = %failure.reason,
                "Book failed to answer"
            );
            failures.push(failure);
        }

        if responses.is_empty() {
            return Err(DispatchError::AllSourcesFailed {
                author: author.name.clone(),
                failures,
            });
        }

        info!(
            author = %author.name,
            answered = responses.len(),
            failed = failures.len(),
            total,
            "Dispatch complete"
        );
        Ok(responses)
    }
}
