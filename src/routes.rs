use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::websocket::{websocket_handler, SignalingState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    status: &'static str,
}

/// GET /health - Health check endpoint
pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus { status: "ok" })
}

/// Build the signaling router. Static assets and middleware layers are
/// added by the caller; tests mount this directly on an ephemeral port.
pub fn build_router(state: SignalingState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .with_state(state)
}
