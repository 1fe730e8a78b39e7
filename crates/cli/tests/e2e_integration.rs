//! End-to-end integration tests for authorchat.
//!
//! These tests drive the whole pipeline from a Twilio webhook to the
//! outbound WhatsApp message: gateway → conversation manager → per-book
//! fan-out → synthesis → SQLite commit → Twilio REST call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use authorchat_agent::{ConversationManager, LlmEngine};
use authorchat_channels::{MessagingService, TwilioChannel};
use authorchat_config::{AppConfig, ProcessingConfig};
use authorchat_core::error::ProviderError;
use authorchat_core::message::{ConversationId, MessageKind};
use authorchat_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use authorchat_core::source::{Author, ContentSource};
use authorchat_core::store::ConversationStore;
use authorchat_gateway::{GatewayState, build_router};
use authorchat_store::{Catalog, SqliteStore};
use axum::body::Body;
use axum::extract::Form;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use tower::ServiceExt;

const AUTHOR_NUMBER: &str = "+14155238886";
const USER_NUMBER: &str = "+15550000001";

// ── Mock LLM ─────────────────────────────────────────────────────────────

/// Answers per-book prompts with the book's title and synthesis prompts
/// with a fixed reply. Records every user prompt.
struct BookAwareProvider {
    prompts: Mutex<Vec<String>>,
    outage: bool,
}

impl BookAwareProvider {
    fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            outage: false,
        }
    }

    fn down() -> Self {
        Self {
            outage: true,
            ..Self::new()
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for BookAwareProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if self.outage {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: "overloaded".into(),
            });
        }

        let prompt = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());

        let content = if prompt.contains("Synthesized response:") {
            "Love is an ideological fantasy, as both books insist.".to_string()
        } else {
            let title = prompt
                .lines()
                .find_map(|l| l.strip_prefix("Book: "))
                .unwrap_or("unknown");
            format!("According to {title}, love is a fall.")
        };

        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: request.model,
        })
    }
}

// ── Fake Twilio ──────────────────────────────────────────────────────────

type Outbox = Arc<Mutex<Vec<HashMap<String, String>>>>;

async fn fake_twilio() -> (String, Outbox) {
    let outbox: Outbox = Arc::new(Mutex::new(Vec::new()));
    let captured = outbox.clone();
    let router = Router::new().route(
        "/Accounts/{sid}/Messages.json",
        post(move |Form(form): Form<HashMap<String, String>>| {
            let captured = captured.clone();
            async move {
                let mut outbox = captured.lock().unwrap();
                outbox.push(form);
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({"sid": format!("SM{}", outbox.len())})),
                )
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), outbox)
}

// ── Harness ──────────────────────────────────────────────────────────────

struct World {
    app: Router,
    store: Arc<SqliteStore>,
    provider: Arc<BookAwareProvider>,
    outbox: Outbox,
}

async fn world(provider: BookAwareProvider, processing: ProcessingConfig) -> World {
    let store = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());

    let mut author = Author::new("Slavoj Zizek");
    author.contact = Some(AUTHOR_NUMBER.into());
    author.bio = Some("Slovenian philosopher".into());
    store.upsert_author(&author).await.unwrap();
    for (title, text) in [
        ("The Sublime Object of Ideology", "ideology text"),
        ("Less Than Nothing", "hegel text"),
    ] {
        store
            .upsert_source(&ContentSource::new("Slavoj Zizek", title, text))
            .await
            .unwrap();
    }

    let provider = Arc::new(provider);
    let engine = Arc::new(LlmEngine::new(provider.clone(), "mock-model").with_reply_limit(1000));
    let manager = Arc::new(ConversationManager::new(
        store.clone(),
        store.clone(),
        engine,
        &processing,
    ));

    let (twilio_url, outbox) = fake_twilio().await;
    let channel = TwilioChannel::new("AC_TEST", "token", AUTHOR_NUMBER).with_api_url(twilio_url);

    let mut config = AppConfig::default();
    config.processing = processing;
    let state = GatewayState::new(config, manager, MessagingService::new(Arc::new(channel)));

    World {
        app: build_router(Arc::new(state)),
        store,
        provider,
        outbox,
    }
}

fn whatsapp_webhook(text: &str) -> Request<Body> {
    let body = format!(
        "Body={}&From=whatsapp%3A%2B15550000001&To=whatsapp%3A%2B14155238886",
        text.replace(' ', "+").replace('?', "%3F")
    );
    Request::builder()
        .method("POST")
        .uri("/webhook/twilio")
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn conversation() -> ConversationId {
    ConversationId::between(USER_NUMBER, AUTHOR_NUMBER)
}

// ── E2E ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_whatsapp_message_round_trip() {
    let w = world(BookAwareProvider::new(), ProcessingConfig::default()).await;

    let response = w.app.clone().oneshot(whatsapp_webhook("What is love?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Two per-book prompts and one synthesis
    let prompts = w.provider.prompts();
    assert_eq!(prompts.len(), 3);
    let synthesis = prompts.iter().find(|p| p.contains("Synthesized response:")).unwrap();
    assert!(synthesis.contains("From The Sublime Object of Ideology:"));
    assert!(synthesis.contains("From Less Than Nothing:"));

    let outbox = w.outbox.lock().unwrap().clone();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0]["To"], "whatsapp:+15550000001");
    assert_eq!(outbox[0]["From"], "whatsapp:+14155238886");
    assert_eq!(outbox[0]["Body"], "Love is an ideological fantasy, as both books insist.");

    let stored = w.store.get(&conversation()).await.unwrap().unwrap();
    assert_eq!(stored.author_id, "Slavoj Zizek");
    assert_eq!(stored.messages.len(), 2);
    assert_eq!(stored.messages[0].kind, MessageKind::User);
    assert_eq!(stored.messages[0].content, "What is love?");
    assert_eq!(stored.messages[1].kind, MessageKind::Author);
    assert_eq!(stored.messages[1].content, outbox[0]["Body"]);
    assert_eq!(w.store.message_count(&conversation()).await.unwrap(), 2);
}

#[tokio::test]
async fn e2e_second_turn_carries_history() {
    let w = world(BookAwareProvider::new(), ProcessingConfig::default()).await;

    w.app.clone().oneshot(whatsapp_webhook("What is love?")).await.unwrap();
    let response = w.app.clone().oneshot(whatsapp_webhook("And ideology?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let prompts = w.provider.prompts();
    let second_turn_book_prompt = prompts
        .iter()
        .find(|p| p.contains("Current Query:\nAnd ideology?"))
        .unwrap();
    assert!(second_turn_book_prompt.contains("User: What is love?"));
    assert!(second_turn_book_prompt.contains("Slavoj Zizek: Love is an ideological fantasy"));

    let stored = w.store.get(&conversation()).await.unwrap().unwrap();
    assert_eq!(stored.messages.len(), 4);
    assert!(stored.last_updated > stored.created_at);
    assert_eq!(w.outbox.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn e2e_provider_outage_sends_apology_and_writes_nothing() {
    let processing = ProcessingConfig {
        fallback_reply: Some("I need a moment to think. Please ask again.".into()),
        ..ProcessingConfig::default()
    };
    let w = world(BookAwareProvider::down(), processing).await;

    let response = w.app.clone().oneshot(whatsapp_webhook("What is love?")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let outbox = w.outbox.lock().unwrap().clone();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0]["Body"], "I need a moment to think. Please ask again.");

    let stored = w.store.get(&conversation()).await.unwrap().unwrap();
    assert!(stored.messages.is_empty());
    assert_eq!(w.store.message_count(&conversation()).await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_concurrent_webhooks_from_one_user_are_serialized() {
    let w = world(BookAwareProvider::new(), ProcessingConfig::default()).await;

    let first = w.app.clone().oneshot(whatsapp_webhook("first question"));
    let second = w.app.clone().oneshot(whatsapp_webhook("second question"));
    let (a, b) = tokio::join!(first, second);
    assert_eq!(a.unwrap().status(), StatusCode::OK);
    assert_eq!(b.unwrap().status(), StatusCode::OK);

    let stored = w.store.get(&conversation()).await.unwrap().unwrap();
    let kinds: Vec<_> = stored.messages.iter().map(|m| m.kind).collect();
    assert_eq!(
        kinds,
        [MessageKind::User, MessageKind::Author, MessageKind::User, MessageKind::Author]
    );
}
