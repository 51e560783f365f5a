//! Movement ledger and stock projection service
//!
//! Movements are the only way stock changes. Stock figures are folded from
//! approved movements on every read; nothing here ever stores a balance.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::{
    current_stock, effective_threshold, project, ApprovalStatus, InventoryMovement,
    LowStockStatus, MovementType, NewMovement, PaginatedResponse, Pagination, StockFilter,
    StockSnapshot,
};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::store::{InsertOutcome, SharedStore};

/// Ledger service for recording and deciding movements
#[derive(Clone)]
pub struct LedgerService {
    store: SharedStore,
    default_threshold: i64,
}

/// Movement submission as received from callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMovementInput {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: String,
    pub quantity: i64,
    /// External event reference; resubmitting the same reference is a no-op
    pub reference: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedMovement {
    pub id: Uuid,
    /// True when the reference had already been recorded
    pub duplicate: bool,
}

/// Idempotency key derived from an external event reference
pub fn idempotency_key(reference: &str) -> String {
    format!("{:x}", Sha256::digest(reference.trim().as_bytes()))
}

impl LedgerService {
    pub fn new(store: SharedStore, default_threshold: i64) -> Self {
        Self {
            store,
            default_threshold,
        }
    }

    /// Append a pending movement to the ledger
    pub async fn record_movement(&self, input: RecordMovementInput) -> AppResult<RecordedMovement> {
        let movement_type: MovementType = input
            .movement_type
            .parse()
            .map_err(|e: shared::UnknownMovementType| AppError::validation("movement_type", e.to_string()))?;

        let movement = NewMovement {
            product_id: input.product_id,
            location_id: input.location_id,
            movement_type,
            quantity: input.quantity,
            reference: input.reference.filter(|r| !r.trim().is_empty()),
            notes: input.notes,
        };
        movement.validate()?;
        shared::validate_quantity(movement.quantity)
            .map_err(|msg| AppError::validation("quantity", msg))?;

        if self.store.get_product(movement.product_id).await?.is_none() {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let key = movement.reference.as_deref().map(idempotency_key);
        match self.store.insert_movement(&movement, key.as_deref()).await? {
            InsertOutcome::Inserted(recorded) => {
                info!(
                    movement_id = %recorded.id,
                    product_id = %recorded.product_id,
                    location_id = %recorded.location_id,
                    movement_type = %recorded.movement_type,
                    quantity = recorded.quantity,
                    "movement recorded"
                );
                Ok(RecordedMovement {
                    id: recorded.id,
                    duplicate: false,
                })
            }
            InsertOutcome::Duplicate(id) => {
                info!(movement_id = %id, "duplicate movement submission ignored");
                Ok(RecordedMovement {
                    id,
                    duplicate: true,
                })
            }
        }
    }

    pub async fn get_movement(&self, id: Uuid) -> AppResult<InventoryMovement> {
        self.store
            .get_movement(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Movement".to_string()))
    }

    /// Approve a pending movement; approving it again is a no-op
    pub async fn approve_movement(&self, id: Uuid) -> AppResult<InventoryMovement> {
        self.decide(id, ApprovalStatus::Approved).await
    }

    /// Reject a pending movement; rejecting it again is a no-op
    pub async fn reject_movement(&self, id: Uuid) -> AppResult<InventoryMovement> {
        self.decide(id, ApprovalStatus::Rejected).await
    }

    async fn decide(&self, id: Uuid, to: ApprovalStatus) -> AppResult<InventoryMovement> {
        let current = self.get_movement(id).await?;
        if current.approval_status == to {
            return Ok(current);
        }
        if !current.approval_status.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition(format!(
                "Movement {} is already {}",
                id,
                current.approval_status.as_str()
            )));
        }

        let approved_at = (to == ApprovalStatus::Approved).then(Utc::now);
        if !self.store.decide_movement(id, to, approved_at).await? {
            // Decided concurrently; report whatever won
            let latest = self.get_movement(id).await?;
            if latest.approval_status == to {
                return Ok(latest);
            }
            return Err(AppError::InvalidStateTransition(format!(
                "Movement {} is already {}",
                id,
                latest.approval_status.as_str()
            )));
        }

        info!(movement_id = %id, status = to.as_str(), "movement decided");
        self.get_movement(id).await
    }

    /// Current stock of a product, optionally at one location
    pub async fn current_stock(&self, product_id: Uuid, location_id: Option<Uuid>) -> AppResult<i64> {
        let filter = StockFilter::at(product_id, location_id);
        let movements = self.store.approved_movements(&filter).await?;
        let stock = current_stock(&movements, &filter);
        debug!(product_id = %product_id, location_id = ?location_id, stock, "stock projected");
        Ok(stock)
    }

    /// One snapshot per product/location pair matching `filter`
    pub async fn stock_snapshots(&self, filter: StockFilter) -> AppResult<Vec<StockSnapshot>> {
        let movements = self.store.approved_movements(&filter).await?;
        Ok(project(&movements, &filter))
    }

    /// Low-stock evaluation of a single product across all locations
    pub async fn check_low_stock(
        &self,
        product_id: Uuid,
        threshold_override: Option<i64>,
    ) -> AppResult<LowStockStatus> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))?;
        let stock = self.current_stock(product_id, None).await?;
        let threshold = effective_threshold(
            threshold_override,
            product.low_stock_threshold,
            self.default_threshold,
        );
        Ok(LowStockStatus::evaluate(&product, stock, threshold))
    }

    /// Products at or below their effective threshold, largest shortage first
    pub async fn low_stock_report(
        &self,
        threshold_override: Option<i64>,
    ) -> AppResult<Vec<LowStockStatus>> {
        if let Some(t) = threshold_override {
            shared::validate_threshold(t).map_err(|msg| AppError::validation("threshold", msg))?;
        }

        let products = self.store.list_products().await?;
        let movements = self.store.approved_movements(&StockFilter::default()).await?;

        let mut report: Vec<LowStockStatus> = products
            .iter()
            .map(|product| {
                let stock = current_stock(&movements, &StockFilter::product(product.id));
                let threshold = effective_threshold(
                    threshold_override,
                    product.low_stock_threshold,
                    self.default_threshold,
                );
                LowStockStatus::evaluate(product, stock, threshold)
            })
            .filter(|status| status.is_low)
            .collect();

        report.sort_by(|a, b| b.shortage.cmp(&a.shortage).then_with(|| a.sku.cmp(&b.sku)));
        info!(low_stock_products = report.len(), "low stock report generated");
        Ok(report)
    }

    pub async fn list_movements(
        &self,
        page: Pagination,
    ) -> AppResult<PaginatedResponse<InventoryMovement>> {
        let (rows, total) = self.store.list_movements(&page).await?;
        Ok(PaginatedResponse::new(rows, &page, total))
    }
}
