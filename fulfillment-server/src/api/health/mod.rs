//! Health API Module

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::core::ServerState;
use crate::utils::{AppError, AppResult};

/// Health router
pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    environment: String,
}

/// Liveness probe backed by a storage read.
async fn health(State(state): State<ServerState>) -> AppResult<Json<HealthReport>> {
    state
        .storage
        .ping()
        .map_err(|e| AppError::storage(e.to_string()))?;
    Ok(Json(HealthReport {
        status: "ok",
        environment: state.config.environment.clone(),
    }))
}
