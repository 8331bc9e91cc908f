use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub storage: bool,
    pub broker: bool,
}

/// Liveness check — `200` only if both storage and broker answer,
/// `503` otherwise (spec §6).
pub async fn health(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_ok = state.storage.health_check().await.is_ok();
    let broker_ok = state.broker.health_check().await.is_ok();

    let status = if storage_ok && broker_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(HealthResponse { storage: storage_ok, broker: broker_ok }))
}
