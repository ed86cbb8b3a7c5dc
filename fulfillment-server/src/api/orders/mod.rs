//! Order API Module
//!
//! Commands (create, authorize payment, cancel) and read-only queries.
//! State transitions driven by partners arrive through the webhook
//! routes, never through this module.

mod handler;

use axum::{
    routing::{get, post},
    Router,
};

use crate::core::ServerState;

/// Order router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/orders", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        .route("/", post(handler::create).get(handler::list))
        // Operator view of orders that exhausted fulfillment
        .route("/dead-letters", get(handler::list_dead_letters))
        .route("/{id}", get(handler::get_by_id))
        .route(
            "/{id}/payment-authorization",
            post(handler::create_payment_authorization),
        )
        .route("/{id}/cancel", post(handler::cancel))
}
