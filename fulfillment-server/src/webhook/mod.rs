//! Webhook ingestion - 签名校验与事件标准化
//!
//! Inbound webhooks are verified and decoded here, away from any storage
//! access, so the signature check can be unit-tested without a database.
//!
//! Contract: a payload is accepted only if
//! 1. its signature verifies against the per-source shared secret,
//! 2. it parses as JSON with an event id, and
//! 3. its declared event type is in the recognized set.
//!
//! Anything else is rejected before business logic runs. There is no
//! bypass toggle: verification is a non-optional precondition in every
//! environment.

pub mod decode;
pub mod verify;

use shared::{EventSource, NormalizedEvent};

pub use decode::decode_event;
pub use verify::{sign_payload, verify_signature};

/// Ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unrecognized event type: {0}")]
    UnrecognizedType(String),
}

/// Verify and decode one inbound webhook delivery.
///
/// On success yields the normalized `(eventId, source, eventType, refs)`
/// tuple the orchestrator consumes.
pub fn ingest(
    source: EventSource,
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<NormalizedEvent, WebhookError> {
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    verify_signature(secret, body, signature)?;
    decode_event(source, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::InboundEventType;

    const SECRET: &str = "whsec_test";

    #[test]
    fn valid_delivery_is_normalized() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded","data":{"order_id":"ord-1","payment_reference":"pay_1"}}"#;
        let sig = sign_payload(SECRET, body);

        let event = ingest(EventSource::Payment, SECRET, Some(&sig), body).unwrap();
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.event_type, InboundEventType::PaymentSucceeded);
        assert_eq!(event.order_id.as_deref(), Some("ord-1"));
        assert_eq!(event.reference.as_deref(), Some("pay_1"));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        assert!(matches!(
            ingest(EventSource::Payment, SECRET, None, body),
            Err(WebhookError::MissingSignature)
        ));
    }

    #[test]
    fn tampered_body_is_rejected_before_parsing() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let sig = sign_payload(SECRET, body);
        let tampered = br#"{"id":"evt_2","type":"payment.succeeded"}"#;
        assert!(matches!(
            ingest(EventSource::Payment, SECRET, Some(&sig), tampered),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let sig = sign_payload("whsec_other", body);
        assert!(matches!(
            ingest(EventSource::Payment, SECRET, Some(&sig), body),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn unrecognized_type_is_rejected() {
        let body = br#"{"id":"evt_1","type":"payment.disputed"}"#;
        let sig = sign_payload(SECRET, body);
        assert!(matches!(
            ingest(EventSource::Payment, SECRET, Some(&sig), body),
            Err(WebhookError::UnrecognizedType(_))
        ));
    }
}
