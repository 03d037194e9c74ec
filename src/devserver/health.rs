use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::devserver::DevState;

/// Health response structure
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub timestamp: String,
}

/// Health routes
pub fn health_routes() -> Router<DevState> {
    Router::new().route("/health", get(health_check))
}

/// GET /health
async fn health_check(State(state): State<DevState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        rooms: state.store.room_count(),
        timestamp: Utc::now().to_rfc3339(),
    })
}
