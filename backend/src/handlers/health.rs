//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use shared::HealthReport;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
}

/// Liveness endpoint handler
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_status = match state.store.ledger_counts().await {
        Ok(_) => "connected".to_string(),
        Err(_) => "disconnected".to_string(),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_status,
    })
}

/// Evaluate every sync health check
pub async fn sync_health(State(state): State<AppState>) -> Json<HealthReport> {
    let report = state.health_monitor().monitor_sync_health().await;
    Json(report)
}
