//! Stock projection over the movement ledger
//!
//! Current stock is never stored. It is folded from approved movements on
//! demand, and the fold is order-independent so any replay of the same
//! movement set yields the same figures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::InventoryMovement;

/// Threshold applied when neither an override nor a product setting exists
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// A product as seen by the ledger (catalogue data is owned elsewhere)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub low_stock_threshold: Option<i64>,
    pub unit_price: Decimal,
}

/// Derived stock figure for one product at one location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub current_stock: i64,
}

/// Selection of movements for a projection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
}

impl StockFilter {
    pub fn product(product_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            location_id: None,
        }
    }

    pub fn at(product_id: Uuid, location_id: Option<Uuid>) -> Self {
        Self {
            product_id: Some(product_id),
            location_id,
        }
    }

    pub fn location(location_id: Uuid) -> Self {
        Self {
            product_id: None,
            location_id: Some(location_id),
        }
    }

    pub fn matches(&self, movement: &InventoryMovement) -> bool {
        self.product_id.map_or(true, |p| p == movement.product_id)
            && self.location_id.map_or(true, |l| l == movement.location_id)
    }
}

/// Totals are summed in 128 bits and pinned to the `i64` range at the end,
/// so the result stays independent of replay order
fn clamp_total(total: i128) -> i64 {
    i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
}

/// Sum of signed quantities of approved movements matching `filter`
pub fn current_stock<'a, I>(movements: I, filter: &StockFilter) -> i64
where
    I: IntoIterator<Item = &'a InventoryMovement>,
{
    let total: i128 = movements
        .into_iter()
        .filter(|m| m.counts_toward_stock() && filter.matches(m))
        .map(|m| i128::from(m.signed_quantity()))
        .sum();
    clamp_total(total)
}

/// Fold movements into one snapshot per (product, location) pair
///
/// Output is ordered by product then location.
pub fn project<'a, I>(movements: I, filter: &StockFilter) -> Vec<StockSnapshot>
where
    I: IntoIterator<Item = &'a InventoryMovement>,
{
    let mut totals: BTreeMap<(Uuid, Uuid), i128> = BTreeMap::new();
    for m in movements
        .into_iter()
        .filter(|m| m.counts_toward_stock() && filter.matches(m))
    {
        *totals.entry((m.product_id, m.location_id)).or_insert(0) += i128::from(m.signed_quantity());
    }

    totals
        .into_iter()
        .map(|((product_id, location_id), current_stock)| StockSnapshot {
            product_id,
            location_id,
            current_stock: clamp_total(current_stock),
        })
        .collect()
}

/// Threshold resolution: explicit override, then product setting, then default
pub fn effective_threshold(
    override_threshold: Option<i64>,
    product_threshold: Option<i64>,
    default_threshold: i64,
) -> i64 {
    override_threshold
        .or(product_threshold)
        .unwrap_or(default_threshold)
}

/// Low-stock evaluation for one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockStatus {
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub current_stock: i64,
    pub threshold: i64,
    pub is_low: bool,
    pub shortage: i64,
}

impl LowStockStatus {
    pub fn evaluate(product: &Product, current_stock: i64, threshold: i64) -> Self {
        Self {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            current_stock,
            threshold,
            is_low: current_stock <= threshold,
            shortage: threshold.saturating_sub(current_stock).max(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApprovalStatus, MovementType};
    use chrono::Utc;

    fn movement(
        product_id: Uuid,
        location_id: Uuid,
        movement_type: MovementType,
        quantity: i64,
        approved: bool,
    ) -> InventoryMovement {
        InventoryMovement {
            id: Uuid::new_v4(),
            product_id,
            location_id,
            movement_type,
            quantity,
            approval_status: if approved {
                ApprovalStatus::Approved
            } else {
                ApprovalStatus::Pending
            },
            approved_at: approved.then(Utc::now),
            idempotency_key: None,
            reference: None,
            notes: None,
            archived: false,
            archived_at: None,
            created_at: Utc::now(),
        }
    }

    fn product(id: Uuid, threshold: Option<i64>) -> Product {
        Product {
            id,
            sku: "SKU-1".to_string(),
            name: "Widget".to_string(),
            low_stock_threshold: threshold,
            unit_price: Decimal::from(100),
        }
    }

    #[test]
    fn test_huge_quantities_do_not_overflow() {
        let p = Uuid::new_v4();
        let l = Uuid::new_v4();
        let ledger = vec![
            movement(p, l, MovementType::Receiving, i64::MAX, true),
            movement(p, l, MovementType::Receiving, i64::MAX, true),
            movement(p, l, MovementType::Shipping, 5, true),
        ];
        let filter = StockFilter::at(p, Some(l));
        assert_eq!(current_stock(&ledger, &filter), i64::MAX);
        assert_eq!(project(&ledger, &filter)[0].current_stock, i64::MAX);

        // Same movements in another order give the same figure
        let reversed: Vec<_> = ledger.iter().rev().cloned().collect();
        assert_eq!(current_stock(&reversed, &filter), i64::MAX);

        let status = LowStockStatus::evaluate(&product(p, Some(10)), i64::MIN, 10);
        assert_eq!(status.shortage, i64::MAX);
    }

    #[test]
    fn test_current_stock_example_sequence() {
        let p = Uuid::new_v4();
        let l = Uuid::new_v4();
        let mut ledger = vec![
            movement(p, l, MovementType::Receiving, 100, true),
            movement(p, l, MovementType::DaToBins, 30, true),
            movement(p, l, MovementType::Shipping, 10, true),
        ];
        let filter = StockFilter::at(p, Some(l));
        assert_eq!(current_stock(&ledger, &filter), 60);

        let status = LowStockStatus::evaluate(&product(p, Some(50)), 60, 50);
        assert!(!status.is_low);
        assert_eq!(status.shortage, 0);

        ledger.push(movement(p, l, MovementType::Shipping, 15, true));
        let stock = current_stock(&ledger, &filter);
        assert_eq!(stock, 45);

        let status = LowStockStatus::evaluate(&product(p, Some(50)), stock, 50);
        assert!(status.is_low);
        assert_eq!(status.shortage, 5);
    }

    #[test]
    fn test_pending_movements_ignored() {
        let p = Uuid::new_v4();
        let l = Uuid::new_v4();
        let ledger = vec![
            movement(p, l, MovementType::Receiving, 100, true),
            movement(p, l, MovementType::Shipping, 70, false),
        ];
        assert_eq!(current_stock(&ledger, &StockFilter::product(p)), 100);
    }

    #[test]
    fn test_location_filter() {
        let p = Uuid::new_v4();
        let l1 = Uuid::new_v4();
        let l2 = Uuid::new_v4();
        let ledger = vec![
            movement(p, l1, MovementType::Receiving, 40, true),
            movement(p, l2, MovementType::Receiving, 25, true),
            movement(p, l2, MovementType::Shipping, 5, true),
        ];
        assert_eq!(current_stock(&ledger, &StockFilter::at(p, Some(l1))), 40);
        assert_eq!(current_stock(&ledger, &StockFilter::at(p, Some(l2))), 20);
        assert_eq!(current_stock(&ledger, &StockFilter::product(p)), 60);
    }

    #[test]
    fn test_project_groups_by_product_and_location() {
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();
        let l = Uuid::new_v4();
        let ledger = vec![
            movement(p1, l, MovementType::Receiving, 10, true),
            movement(p2, l, MovementType::DaToDa, 7, true),
            movement(p1, l, MovementType::DaToBins, 3, true),
        ];
        let snapshots = project(&ledger, &StockFilter::location(l));
        assert_eq!(snapshots.len(), 2);
        let p1_stock = snapshots.iter().find(|s| s.product_id == p1).unwrap();
        assert_eq!(p1_stock.current_stock, 7);
        let p2_stock = snapshots.iter().find(|s| s.product_id == p2).unwrap();
        assert_eq!(p2_stock.current_stock, 7);
    }

    #[test]
    fn test_effective_threshold_precedence() {
        assert_eq!(effective_threshold(Some(5), Some(20), 10), 5);
        assert_eq!(effective_threshold(None, Some(20), 10), 20);
        assert_eq!(effective_threshold(None, None, 10), 10);
    }

    #[test]
    fn test_low_stock_at_threshold_is_low() {
        let p = Uuid::new_v4();
        let status = LowStockStatus::evaluate(&product(p, None), 10, 10);
        assert!(status.is_low);
        assert_eq!(status.shortage, 0);
    }
}
