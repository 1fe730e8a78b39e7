//! HTTP gateway for authorchat.
//!
//! Receives WhatsApp messages and delivery callbacks from Twilio, runs
//! each message through the conversation pipeline and sends the reply
//! back through the messaging service.
//!
//! Routes:
//! - `POST /webhook/twilio` - inbound message (`Body`, `From`, `To`)
//! - `POST /webhook/status` - delivery callback (`MessageSid`, `MessageStatus`)
//! - `GET /health`

use std::sync::Arc;

use authorchat_agent::ConversationManager;
use authorchat_channels::MessagingService;
use authorchat_channels::twilio::validate_signature;
use authorchat_config::AppConfig;
use authorchat_core::error::ConversationError;
use axum::extract::{DefaultBodyLimit, Form, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tracing::{error, info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub manager: Arc<ConversationManager>,
    pub messaging: MessagingService,
}

impl GatewayState {
    pub fn new(
        config: AppConfig,
        manager: Arc<ConversationManager>,
        messaging: MessagingService,
    ) -> Self {
        Self {
            config,
            manager,
            messaging,
        }
    }

    /// Token and public base URL, when webhook signatures are checked.
    fn signature_check(&self) -> Option<(&str, &str)> {
        let token = self.config.twilio.auth_token.as_deref()?;
        let base = self.config.gateway.public_url.as_deref()?;
        Some((token, base))
    }
}

type SharedState = Arc<GatewayState>;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn reject(status: StatusCode, error: impl Into<String>) -> HandlerError {
    (status, Json(ErrorResponse { error: error.into() }))
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook/twilio", post(twilio_webhook_handler))
        .route("/webhook/status", post(status_webhook_handler))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway until the process stops.
pub async fn start(state: GatewayState) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", state.config.gateway.host, state.config.gateway.port);
    if state.signature_check().is_none() {
        warn!("Webhook signature verification disabled; set gateway.public_url and twilio.auth_token to enable it");
    }

    let app = build_router(Arc::new(state));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    turns_in_flight: usize,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        turns_in_flight: state.manager.active_turns(),
    })
}

fn field<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

/// Reject the request unless it carries a valid `X-Twilio-Signature`.
fn verify(
    state: &GatewayState,
    headers: &HeaderMap,
    uri: &Uri,
    params: &[(String, String)],
) -> Result<(), HandlerError> {
    let Some((token, base)) = state.signature_check() else {
        return Ok(());
    };
    let url = format!("{}{}", base.trim_end_matches('/'), uri);
    let signature = headers
        .get("X-Twilio-Signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if validate_signature(token, &url, params, signature) {
        Ok(())
    } else {
        warn!(url = %url, "Rejected webhook with invalid signature");
        Err(reject(StatusCode::FORBIDDEN, "invalid signature"))
    }
}

async fn twilio_webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<StatusCode, HandlerError> {
    verify(&state, &headers, &uri, &params)?;

    let body = field(&params, "Body").unwrap_or_default();
    let Some(from) = field(&params, "From") else {
        return Err(reject(StatusCode::BAD_REQUEST, "missing From"));
    };
    let to = field(&params, "To")
        .or(state.config.twilio.phone_number.as_deref())
        .unwrap_or_default();
    if body.trim().is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "empty message body"));
    }

    let message = state.messaging.incoming(body, from, to);
    info!(
        sender = %message.sender_id,
        recipient = %message.recipient_id,
        chars = message.content.chars().count(),
        "Received message"
    );

    let reply = match state.manager.process_message(&message).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, conversation_id = %message.conversation_id, "Turn failed");
            if let Some(fallback) = &state.config.processing.fallback_reply {
                if let Err(send_err) = state
                    .messaging
                    .send(
                        fallback,
                        &message.sender_id,
                        &message.recipient_id,
                        &message.conversation_id,
                    )
                    .await
                {
                    error!(error = %send_err, "Could not deliver fallback reply");
                }
            }
            return Err(match e {
                ConversationError::UnknownAuthor(_) => {
                    reject(StatusCode::BAD_REQUEST, e.to_string())
                }
                _ => reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
            });
        }
    };

    state
        .messaging
        .send(&reply, &message.sender_id, &message.recipient_id, &message.conversation_id)
        .await
        .map_err(|e| {
            error!(error = %e, conversation_id = %message.conversation_id, "Reply delivery failed");
            reject(StatusCode::BAD_GATEWAY, e.to_string())
        })?;

    Ok(StatusCode::OK)
}

async fn status_webhook_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Result<StatusCode, HandlerError> {
    verify(&state, &headers, &uri, &params)?;

    let (Some(sid), Some(status)) =
        (field(&params, "MessageSid"), field(&params, "MessageStatus"))
    else {
        return Err(reject(StatusCode::BAD_REQUEST, "missing MessageSid or MessageStatus"));
    };

    state.messaging.status_update(sid, status).await.map_err(|e| {
        error!(error = %e, message_id = %sid, "Status update failed");
        reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    })?;
    Ok(StatusCode::OK)
}
