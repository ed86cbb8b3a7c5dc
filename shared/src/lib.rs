//! Shared types for the poster fulfillment service
//!
//! Domain types used by the fulfillment server and any future client:
//! order lifecycle types, inbound webhook event types, and the
//! processed-event ledger types.

pub mod order;

// Re-exports
pub use order::{
    EventOutcome, EventSource, InboundEventType, NormalizedEvent, Order, OrderStatus,
    PosterFinish, PosterSize, ProcessedEvent, ShippingAddress,
};
