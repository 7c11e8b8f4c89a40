//! Health check endpoint.

use axum::{extract::State, Json};
use chromabase_core::{record::format_timestamp, HubStats};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub timestamp: String,
    pub store: &'static str,
    pub stats: HubStats,
}

/// Health check endpoint.
/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.config.service_name.clone(),
        timestamp: format_timestamp(chrono::Utc::now()),
        store: state.gateway.backend(),
        stats: state.hub.stats().await,
    })
}
