/// Facebook Messenger channel adapter.
///
/// Uses the Messenger Platform webhooks and Send API:
///  - Inbound: `POST {webhook_path}` with a `page` subscription payload
///  - Verification: `GET {webhook_path}?hub.mode=subscribe&hub.verify_token=..&hub.challenge=..`
///  - Outbound: `POST {graph_url}/me/messages?access_token=..`
use std::sync::Arc;

use apibot_commands::{default_client, CommandDispatcher, RendererRegistry};
use apibot_core::{ApiBotError, CommandRequest, DeliveryAdapter, OutboundMessage, RequestAdapter};
use apibot_logging::redact_sensitive_data;
use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Messenger rejects message texts longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 640;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v2.6";

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MessengerConfig {
    pub access_token: String,
    pub verify_token: String,
    pub graph_url: String,
}

// ---------------------------------------------------------------------------
// Webhook wire types (minimal subset)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub messaging: Vec<MessagingEvent>,
}

#[derive(Debug, Deserialize)]
pub struct MessagingEvent {
    pub sender: Participant,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Participant {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    recipient: Participant,
    message: SendMessage<'a>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    text: &'a str,
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct MessengerAdapter {
    config: MessengerConfig,
    http_client: Client,
}

impl MessengerAdapter {
    pub fn new(config: MessengerConfig) -> Self {
        Self::with_client(config, default_client())
    }

    pub fn with_client(config: MessengerConfig, http_client: Client) -> Self {
        Self { config, http_client }
    }

    fn send_url(&self) -> String {
        format!("{}/me/messages", self.config.graph_url.trim_end_matches('/'))
    }

    /// Answer a subscription challenge; `None` means the request must be refused.
    pub fn verify(&self, request: &VerifyRequest) -> Option<String> {
        (request.mode == "subscribe" && request.verify_token == self.config.verify_token)
            .then(|| request.challenge.clone())
    }

    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ApiBotError> {
        let body = SendRequest {
            recipient: Participant {
                id: recipient.to_string(),
            },
            message: SendMessage { text },
        };
        let res = self
            .http_client
            .post(self.send_url())
            .query(&[("access_token", self.config.access_token.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let message = redact_sensitive_data(&e.to_string());
                error!("[Messenger] Send request failed: {}", message);
                ApiBotError::delivery("messenger", message)
            })?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = res.text().await.unwrap_or_default();
        error!(status = %status, body = %redact_sensitive_data(&detail), "[Messenger] Unable to send message");
        Err(ApiBotError::delivery(
            "messenger",
            format!("Send API returned {status}"),
        ))
    }
}

impl RequestAdapter for MessengerAdapter {
    fn name(&self) -> &str {
        "messenger"
    }

    /// Only `page` subscriptions carry messages; every messaging event becomes
    /// one request, with `text` absent for attachments and the like.
    fn process(&self, raw: &serde_json::Value) -> Vec<CommandRequest> {
        let payload: WebhookPayload = match serde_json::from_value(raw.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!("[Messenger] Unrecognised webhook payload: {}", e);
                return Vec::new();
            }
        };
        if payload.object != "page" {
            debug!(object = %payload.object, "[Messenger] Ignoring non-page payload");
            return Vec::new();
        }
        payload
            .entry
            .into_iter()
            .flat_map(|entry| entry.messaging)
            .map(|event| {
                CommandRequest::new(event.sender.id, event.message.and_then(|m| m.text))
            })
            .collect()
    }
}

#[async_trait]
impl DeliveryAdapter for MessengerAdapter {
    fn name(&self) -> &str {
        "messenger"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<(), ApiBotError> {
        if message.text.trim().is_empty() {
            warn!(recipient = %message.sender_id, "[Messenger] Rendered reply is empty, nothing sent");
            return Ok(());
        }
        for chunk in split_message(&message.text, MAX_MESSAGE_CHARS) {
            self.send_text(&message.sender_id, &chunk).await?;
        }
        Ok(())
    }
}

/// Split `text` into pieces of at most `limit` characters, preferring
/// paragraph, then line, then word boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text.trim();
    while !remaining.is_empty() {
        let Some((cut, _)) = remaining.char_indices().nth(limit) else {
            chunks.push(remaining.to_string());
            break;
        };
        let window = &remaining[..cut];
        let split = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(cut);
        chunks.push(remaining[..split].trim_end().to_string());
        remaining = remaining[split..].trim_start();
    }
    chunks
}

// ---------------------------------------------------------------------------
// Webhook routes
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct WebhookState {
    pub adapter: Arc<MessengerAdapter>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub registry: Arc<RendererRegistry>,
}

/// Build the Messenger webhook router mounted at `path`.
pub fn build_router(path: &str, state: WebhookState) -> Router {
    Router::new()
        .route(path, get(verify_webhook).post(handle_webhook))
        .with_state(state)
}

async fn verify_webhook(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyRequest>,
) -> Result<String, StatusCode> {
    match state.adapter.verify(&params) {
        Some(challenge) => {
            info!("[Messenger] Webhook verified");
            Ok(challenge)
        }
        None => {
            error!("[Messenger] Webhook verification failed");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Acknowledge at once; the platform retries deliveries that are not answered quickly.
async fn handle_webhook(
    State(state): State<WebhookState>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, &'static str) {
    tokio::spawn(async move {
        match state.dispatcher.exec(&payload, &state.registry).await {
            Ok(outcome) => info!(
                delivered = outcome.jobs.len(),
                skipped = outcome.skipped.len(),
                "[Messenger] Event handled"
            ),
            Err(e) => error!(kind = e.kind(), error = %e, "[Messenger] Event failed"),
        }
    });
    (StatusCode::OK, "EVENT_RECEIVED")
}
