//! Webhook payload decoding
//!
//! Wire format shared by both partners:
//!
//! ```json
//! {
//!   "id": "evt_12345",
//!   "type": "payment.succeeded",
//!   "data": {
//!     "order_id": "c0a8...",
//!     "payment_reference": "pay_9f2"
//!   }
//! }
//! ```
//!
//! `data.order_id` is the echo field partners are contractually required
//! to send back; the reference fields exist for reverse lookup when an
//! older integration omits the echo.

use super::WebhookError;
use serde::Deserialize;
use shared::{EventSource, InboundEventType, NormalizedEvent};

#[derive(Deserialize)]
struct WirePayload {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: WireData,
}

#[derive(Deserialize, Default)]
struct WireData {
    order_id: Option<String>,
    payment_reference: Option<String>,
    job_reference: Option<String>,
}

/// Map a declared type string to the recognized set for the source.
fn parse_event_type(
    source: EventSource,
    declared: &str,
) -> Result<InboundEventType, WebhookError> {
    let parsed = match (source, declared) {
        (EventSource::Payment, "payment.succeeded") => InboundEventType::PaymentSucceeded,
        (EventSource::Fulfillment, "job.submitted") => InboundEventType::JobSubmitted,
        (EventSource::Fulfillment, "job.in_progress") => InboundEventType::JobInProgress,
        (EventSource::Fulfillment, "job.shipped") => InboundEventType::JobShipped,
        (EventSource::Fulfillment, "job.delivered") => InboundEventType::JobDelivered,
        (EventSource::Fulfillment, "job.cancelled") => InboundEventType::JobCancelled,
        _ => return Err(WebhookError::UnrecognizedType(declared.to_string())),
    };
    Ok(parsed)
}

/// Decode a verified payload into a normalized event.
pub fn decode_event(source: EventSource, body: &[u8]) -> Result<NormalizedEvent, WebhookError> {
    let wire: WirePayload =
        serde_json::from_slice(body).map_err(|e| WebhookError::Malformed(e.to_string()))?;

    if wire.id.trim().is_empty() {
        return Err(WebhookError::Malformed("empty event id".to_string()));
    }

    let event_type = parse_event_type(source, &wire.event_type)?;

    let reference = match source {
        EventSource::Payment => wire.data.payment_reference,
        EventSource::Fulfillment => wire.data.job_reference,
    };

    Ok(NormalizedEvent {
        event_id: wire.id,
        source,
        event_type,
        order_id: wire.data.order_id,
        reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfillment_types_decode() {
        for (declared, expected) in [
            ("job.submitted", InboundEventType::JobSubmitted),
            ("job.in_progress", InboundEventType::JobInProgress),
            ("job.shipped", InboundEventType::JobShipped),
            ("job.delivered", InboundEventType::JobDelivered),
            ("job.cancelled", InboundEventType::JobCancelled),
        ] {
            let body = format!(
                r#"{{"id":"f_1","type":"{declared}","data":{{"job_reference":"job_9"}}}}"#
            );
            let event = decode_event(EventSource::Fulfillment, body.as_bytes()).unwrap();
            assert_eq!(event.event_type, expected, "{declared}");
            assert_eq!(event.reference.as_deref(), Some("job_9"));
        }
    }

    #[test]
    fn payment_type_is_not_valid_for_fulfillment_source() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        assert!(matches!(
            decode_event(EventSource::Fulfillment, body),
            Err(WebhookError::UnrecognizedType(_))
        ));
    }

    #[test]
    fn missing_data_block_yields_no_refs() {
        let body = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let event = decode_event(EventSource::Payment, body).unwrap();
        assert!(event.order_id.is_none());
        assert!(event.reference.is_none());
    }

    #[test]
    fn garbage_and_empty_ids_are_malformed() {
        assert!(matches!(
            decode_event(EventSource::Payment, b"not json"),
            Err(WebhookError::Malformed(_))
        ));
        assert!(matches!(
            decode_event(EventSource::Payment, br#"{"id":"  ","type":"payment.succeeded"}"#),
            Err(WebhookError::Malformed(_))
        ));
    }
}
