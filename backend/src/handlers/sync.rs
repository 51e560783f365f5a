//! Bin synchronization handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use shared::{StateFilter, SyncTarget};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::{FailedJob, SyncOutcome, SyncRequest};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct SyncBinsRequest {
    #[serde(default)]
    pub dry_run: bool,
    /// Restrict the pass to one delivery agent's zone
    pub da_id: Option<Uuid>,
    /// `all` or a state name
    pub state: Option<String>,
}

/// Run one sync pass and return its outcome
pub async fn sync_bins(
    State(state): State<AppState>,
    Json(body): Json<SyncBinsRequest>,
) -> AppResult<Json<SyncOutcome>> {
    let state_filter = match body.state.as_deref() {
        Some(value) => {
            shared::parse_state_filter(value).map_err(|msg| AppError::validation("state", msg))?
        }
        None => StateFilter::All,
    };
    let request = SyncRequest {
        target: body.da_id.map_or(SyncTarget::Global, SyncTarget::Agent),
        dry_run: body.dry_run,
        state_filter,
    };

    let outcome = state
        .orchestrator()
        .sync_bins(&request, &CancellationToken::new())
        .await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct QueueStatus {
    pub backlog: usize,
    pub failed: Vec<FailedJob>,
}

pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(QueueStatus {
        backlog: state.queue.backlog(),
        failed: state.queue.failed_jobs(),
    })
}
