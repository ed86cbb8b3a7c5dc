//! Order API Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Order, PosterFinish, PosterSize, ShippingAddress};

use crate::core::ServerState;
use crate::orders::DeadLetterEntry;
use crate::services::PaymentAuthorization;
use crate::utils::validation::{
    validate_country_code, validate_email, validate_required_text, MAX_ID_LEN, MAX_NAME_LEN,
    MAX_POSTAL_CODE_LEN,
};
use crate::utils::{AppError, AppResult};

/// Create order payload. No amount field: pricing is server-side only.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub draft_id: String,
    pub customer_email: String,
    pub size: PosterSize,
    pub finish: PosterFinish,
    pub shipping_address: ShippingAddress,
}

impl CreateOrderRequest {
    fn validate(&self) -> Result<(), AppError> {
        validate_required_text(&self.draft_id, "draft_id", MAX_ID_LEN)?;
        validate_email(&self.customer_email, "customer_email")?;

        let addr = &self.shipping_address;
        validate_required_text(&addr.recipient, "shipping_address.recipient", MAX_NAME_LEN)?;
        validate_required_text(&addr.street, "shipping_address.street", MAX_NAME_LEN)?;
        validate_required_text(&addr.city, "shipping_address.city", MAX_NAME_LEN)?;
        validate_required_text(
            &addr.postal_code,
            "shipping_address.postal_code",
            MAX_POSTAL_CODE_LEN,
        )?;
        validate_country_code(&addr.country, "shipping_address.country")?;
        Ok(())
    }
}

/// Create a new pending order
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<Order>)> {
    payload.validate()?;
    let order = state.orchestrator.create_order(
        payload.draft_id,
        payload.customer_email,
        payload.size,
        payload.finish,
        payload.shipping_address,
    )?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Query params for listing orders
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List orders (paginated, newest first)
pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Order>>> {
    let orders = state
        .storage
        .list_orders(query.limit.min(500), query.offset)
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(Json(orders))
}

/// Get order by id
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state
        .storage
        .get_order(&id)
        .map_err(|e| AppError::storage(e.to_string()))?
        .ok_or_else(|| AppError::not_found(format!("Order {} not found", id)))?;
    Ok(Json(order))
}

/// Request a payment authorization for a pending order
pub async fn create_payment_authorization(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<PaymentAuthorization>> {
    let auth = state.orchestrator.create_payment_authorization(&id).await?;
    Ok(Json(auth))
}

/// Cancel a pending order
pub async fn cancel(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<Order>> {
    let order = state.orchestrator.cancel_order(&id)?;
    Ok(Json(order))
}

/// List orders that exhausted fulfillment (operator tooling)
pub async fn list_dead_letters(
    State(state): State<ServerState>,
) -> AppResult<Json<Vec<DeadLetterEntry>>> {
    let entries = state
        .storage
        .list_dead_letters()
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(Json(entries))
}
