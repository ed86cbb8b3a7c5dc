//! Webhook API Module
//!
//! 支付网关与打印伙伴的回调入口。
//!
//! Contract with both partners: a 2xx response means the event is
//! durably recorded and will never need redelivery; any other status
//! asks the partner to retry later.

mod handler;

use axum::{routing::post, Router};

use crate::core::ServerState;

/// Signature header shared by both partners
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Webhook router
pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/webhooks/payment", post(handler::payment))
        .route("/webhooks/fulfillment", post(handler::fulfillment))
}
