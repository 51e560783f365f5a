//! HTTP handlers for stock figures

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::{LowStockStatus, StockFilter, StockSnapshot};
use uuid::Uuid;

use crate::error::AppResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub location_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StockResponse {
    pub product_id: Uuid,
    pub location_id: Option<Uuid>,
    pub current_stock: i64,
}

/// Current stock of one product, overall or at one location
pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<StockQuery>,
) -> AppResult<Json<StockResponse>> {
    let current_stock = state
        .ledger()
        .current_stock(product_id, query.location_id)
        .await?;
    Ok(Json(StockResponse {
        product_id,
        location_id: query.location_id,
        current_stock,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

/// Stock per product/location pair
pub async fn list_snapshots(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> AppResult<Json<Vec<StockSnapshot>>> {
    let filter = StockFilter {
        product_id: query.product_id,
        location_id: query.location_id,
    };
    let snapshots = state.ledger().stock_snapshots(filter).await?;
    Ok(Json(snapshots))
}

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i64>,
}

/// Products at or below their low-stock threshold
pub async fn low_stock(
    State(state): State<AppState>,
    Query(query): Query<LowStockQuery>,
) -> AppResult<Json<Vec<LowStockStatus>>> {
    let report = state.ledger().low_stock_report(query.threshold).await?;
    Ok(Json(report))
}
