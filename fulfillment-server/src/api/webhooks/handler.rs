//! Webhook API Handlers
//!
//! Handlers receive the raw body: the signature covers the exact bytes
//! on the wire, so extraction must not deserialize first.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use shared::EventSource;

use super::SIGNATURE_HEADER;
use crate::core::ServerState;
use crate::utils::{AppError, AppResult};
use crate::webhook::{self, WebhookError};

#[derive(Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub outcome: String,
}

/// Payment gateway callback
pub async fn payment(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let secret = state.config.payment_webhook_secret.clone();
    process(state, EventSource::Payment, &secret, &headers, &body).await
}

/// Print partner callback
pub async fn fulfillment(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let secret = state.config.fulfillment_webhook_secret.clone();
    process(state, EventSource::Fulfillment, &secret, &headers, &body).await
}

async fn process(
    state: ServerState,
    source: EventSource,
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let event = webhook::ingest(source, secret, signature, body).map_err(map_webhook_error)?;

    // The outcome is committed before this returns; a 200 here is the
    // durable acknowledgement the partners rely on.
    let outcome = state.orchestrator.handle_event(&event).await?;

    tracing::info!(
        source = %source.as_str(),
        event_id = %event.event_id,
        outcome = %outcome,
        "Webhook processed"
    );

    Ok(Json(WebhookAck {
        event_id: event.event_id,
        outcome: outcome.to_string(),
    }))
}

fn map_webhook_error(err: WebhookError) -> AppError {
    match err {
        WebhookError::MissingSignature | WebhookError::InvalidSignature => {
            AppError::InvalidSignature
        }
        WebhookError::Malformed(_) | WebhookError::UnrecognizedType(_) => {
            AppError::MalformedWebhook(err.to_string())
        }
    }
}
