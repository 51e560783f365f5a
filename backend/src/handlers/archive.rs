//! Ledger archival handler

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::services::ArchivalReport;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    /// Approved movements older than this are archived
    pub before: DateTime<Utc>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn archive_movements(
    State(state): State<AppState>,
    Json(body): Json<ArchiveRequest>,
) -> AppResult<Json<ArchivalReport>> {
    if body.before > Utc::now() {
        return Err(AppError::validation("before", "Cutoff must not be in the future"));
    }
    let report = state
        .archival()
        .archive_older_than(body.before, body.dry_run)
        .await?;
    Ok(Json(report))
}
