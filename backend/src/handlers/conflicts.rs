//! Conflict detection and resolution handlers

use axum::{extract::State, Json};

use crate::error::AppResult;
use crate::services::{ConflictReport, ResolutionSummary};
use crate::AppState;

/// Detect conflicts across both subsystems and the external system
pub async fn list_conflicts(State(state): State<AppState>) -> AppResult<Json<ConflictReport>> {
    let report = state.detector().detect_all_conflicts().await?;
    Ok(Json(report))
}

/// Resolve every auto-resolvable conflict; the rest go to manual review
pub async fn resolve_conflicts(State(state): State<AppState>) -> AppResult<Json<ResolutionSummary>> {
    let results = state.resolver().auto_resolve_conflicts().await?;
    Ok(Json(ResolutionSummary::from_results(results)))
}
