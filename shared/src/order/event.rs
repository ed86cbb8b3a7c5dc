//! Inbound webhook events and the processed-event ledger types
//!
//! External senders deliver events at-least-once and in no guaranteed
//! order. Ingestion verifies and normalizes each payload into a
//! [`NormalizedEvent`]; the orchestrator records the result of every
//! delivery as a [`ProcessedEvent`] keyed by `(source, event_id)`.

use serde::{Deserialize, Serialize};

/// Which external system sent the event
///
/// Event ids are namespaced by source: two senders may reuse the same id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventSource {
    Payment,
    Fulfillment,
}

impl EventSource {
    /// Stable key prefix for ledger rows
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Payment => "payment",
            EventSource::Fulfillment => "fulfillment",
        }
    }
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recognized inbound event types
///
/// Anything outside this set is rejected by ingestion before it reaches
/// the orchestrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundEventType {
    // Payment processor
    PaymentSucceeded,

    // Print partner status callbacks
    JobSubmitted,
    JobInProgress,
    JobShipped,
    JobDelivered,
    JobCancelled,
}

impl std::fmt::Display for InboundEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InboundEventType::PaymentSucceeded => write!(f, "PAYMENT_SUCCEEDED"),
            InboundEventType::JobSubmitted => write!(f, "JOB_SUBMITTED"),
            InboundEventType::JobInProgress => write!(f, "JOB_IN_PROGRESS"),
            InboundEventType::JobShipped => write!(f, "JOB_SHIPPED"),
            InboundEventType::JobDelivered => write!(f, "JOB_DELIVERED"),
            InboundEventType::JobCancelled => write!(f, "JOB_CANCELLED"),
        }
    }
}

/// Verified, decoded webhook event handed to the orchestrator
///
/// Order resolution uses `order_id` (the echo field partners are required
/// to send back) first, then falls back to a reverse lookup on
/// `reference` (payment authorization id or print job id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedEvent {
    /// Event id as assigned by the sending system
    pub event_id: String,
    pub source: EventSource,
    pub event_type: InboundEventType,
    /// Order id echoed back by the partner, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// External reference (payment authorization / print job id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Outcome of processing one inbound event
///
/// Skips are not errors: duplicate, out-of-order and foreign webhooks are
/// expected traffic and must be acknowledged to the sender.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventOutcome {
    /// Transition applied; carries the new status
    Applied { new_status: super::OrderStatus },
    /// Order already at or past the target state (webhook redelivered or
    /// raced with another handler)
    AlreadyApplied,
    /// No matching order; test/foreign traffic
    SkippedUnknownOrder,
    /// Event invalid for the order's current state (out-of-order delivery)
    SkippedInvalidTransition,
}

impl std::fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventOutcome::Applied { new_status } => write!(f, "applied:{new_status}"),
            EventOutcome::AlreadyApplied => write!(f, "noop:already-applied"),
            EventOutcome::SkippedUnknownOrder => write!(f, "skipped:unknown-order"),
            EventOutcome::SkippedInvalidTransition => write!(f, "skipped:invalid-transition"),
        }
    }
}

/// Idempotency ledger entry - a write-once fact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedEvent {
    /// External event id (unique within `source`)
    pub event_id: String,
    pub source: EventSource,
    /// Order the event resolved to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub outcome: EventOutcome,
    /// Processing timestamp (Unix milliseconds)
    pub processed_at: i64,
}

impl ProcessedEvent {
    pub fn new(event: &NormalizedEvent, order_id: Option<String>, outcome: EventOutcome) -> Self {
        Self {
            event_id: event.event_id.clone(),
            source: event.source,
            order_id,
            outcome,
            processed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
