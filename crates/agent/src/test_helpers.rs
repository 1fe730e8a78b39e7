//! Shared test doubles for the turn pipeline.

use async_trait::async_trait;
use authorchat_core::engine::{GeneratedResponse, GenerationEngine};
use authorchat_core::error::{GenerationError, ProviderError};
use authorchat_core::message::ConversationContext;
use authorchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use authorchat_core::source::{Author, ContentSource};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A provider that always returns the same text and records every request.
pub struct RecordingProvider {
    reply: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RecordingProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: text.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    fn name(&self) -> &str {
        "recording_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            content: self.reply.clone(),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

/// How the scripted engine answers for one book.
#[derive(Clone)]
pub enum Script {
    /// Answer immediately
    Reply(String),
    /// Answer after a delay
    Slow(Duration, String),
    /// Fail with a generation error
    Fail(String),
    /// Panic inside the engine call
    Panic,
}

/// How the scripted engine synthesizes.
#[derive(Clone)]
pub enum Synthesis {
    /// Join the per-book titles into a reply
    Echo,
    Reply(String),
    Slow(Duration, String),
    Fail(String),
}

/// A [`GenerationEngine`] whose behavior is set per book title.
///
/// Unknown titles answer with `"<title> says hello"`.
pub struct ScriptedEngine {
    scripts: HashMap<String, Script>,
    synthesis: Synthesis,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    answered: Mutex<Vec<String>>,
    synthesized: Mutex<Vec<Vec<GeneratedResponse>>>,
    author_books_seen: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            synthesis: Synthesis::Echo,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            answered: Mutex::new(Vec::new()),
            synthesized: Mutex::new(Vec::new()),
            author_books_seen: AtomicUsize::new(0),
        }
    }

    pub fn script(mut self, title: &str, script: Script) -> Self {
        self.scripts.insert(title.into(), script);
        self
    }

    pub fn synthesis(mut self, synthesis: Synthesis) -> Self {
        self.synthesis = synthesis;
        self
    }

    /// Titles whose answers completed, in completion order.
    pub fn answered(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }

    /// The response sets handed to every synthesis call.
    pub fn synthesized(&self) -> Vec<Vec<GeneratedResponse>> {
        self.synthesized.lock().unwrap().clone()
    }

    /// Most `Author::sources` entries carried by any `answer` call.
    pub fn author_books_seen(&self) -> usize {
        self.author_books_seen.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `answer` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn answer(
        &self,
        author: &Author,
        source: &ContentSource,
        _context: &ConversationContext,
        _query: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        self.author_books_seen.fetch_max(author.sources.len(), Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self
            .scripts
            .get(&source.title)
            .cloned()
            .unwrap_or_else(|| Script::Reply(format!("{} says hello", source.title)));

        let content = match script {
            Script::Reply(text) => text,
            Script::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                text
            }
            Script::Fail(reason) => return Err(GenerationError::Failed(reason)),
            Script::Panic => panic!("engine blew up on {}", source.title),
        };

        self.answered.lock().unwrap().push(source.title.clone());
        Ok(GeneratedResponse::new(&source.title, content))
    }

    async fn synthesize(
        &self,
        _author: &Author,
        responses: &[GeneratedResponse],
        _query: &str,
    ) -> Result<String, GenerationError> {
        self.synthesized.lock().unwrap().push(responses.to_vec());
        match &self.synthesis {
            Synthesis::Echo => Ok(format!(
                "Drawing on {}",
                responses
                    .iter()
                    .map(|r| r.source_title.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Synthesis::Reply(text) => Ok(text.clone()),
            Synthesis::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
            Synthesis::Fail(reason) => Err(GenerationError::Failed(reason.clone())),
        }
    }
}

/// An author with one book per title, each book's content set to its title.
pub fn author_with_books(name: &str, titles: &[&str]) -> Author {
    let mut author = Author::new(name);
    author.contact = Some(format!("+1555{}", name.len()));
    author.sources = titles
        .iter()
        .map(|t| ContentSource::new(name, *t, *t))
        .collect();
    author
}
