//! Order lifecycle types
//!
//! This module provides the types shared by the fulfillment orchestrator
//! and its API surface:
//! - Orders: the customer's purchase request and its lifecycle state
//! - Events: normalized inbound webhook events from external partners
//! - Ledger: processed-event records used for idempotent delivery

pub mod event;
pub mod types;

// Re-exports
pub use event::{EventOutcome, EventSource, InboundEventType, NormalizedEvent, ProcessedEvent};
pub use types::{Order, OrderStatus, PosterFinish, PosterSize, ShippingAddress};
