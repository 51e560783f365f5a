//! HTTP handlers for the movement ledger

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{InventoryMovement, PaginatedResponse, Pagination};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::{RecordMovementInput, RecordedMovement};
use crate::AppState;

/// Record a pending movement
///
/// A resubmitted reference answers `200` with the existing id instead of `201`.
pub async fn record_movement(
    State(state): State<AppState>,
    Json(input): Json<RecordMovementInput>,
) -> AppResult<(StatusCode, Json<RecordedMovement>)> {
    let recorded = state.ledger().record_movement(input).await?;
    let status = if recorded.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(recorded)))
}

#[derive(Debug, Deserialize)]
pub struct ListMovementsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_movements(
    State(state): State<AppState>,
    Query(query): Query<ListMovementsQuery>,
) -> AppResult<Json<PaginatedResponse<InventoryMovement>>> {
    let defaults = Pagination::default();
    let page = Pagination {
        page: query.page.unwrap_or(defaults.page),
        per_page: query.per_page.unwrap_or(defaults.per_page),
    };
    let movements = state.ledger().list_movements(page).await?;
    Ok(Json(movements))
}

pub async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<InventoryMovement>> {
    let movement = state.ledger().get_movement(movement_id).await?;
    Ok(Json(movement))
}

/// Approve a pending movement
pub async fn approve_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<InventoryMovement>> {
    let movement = state.ledger().approve_movement(movement_id).await?;
    Ok(Json(movement))
}

/// Reject a pending movement
pub async fn reject_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> AppResult<Json<InventoryMovement>> {
    let movement = state.ledger().reject_movement(movement_id).await?;
    Ok(Json(movement))
}
