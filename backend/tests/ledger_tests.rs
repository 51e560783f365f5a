//! Movement ledger and stock projection tests
//!
//! - Stock is the sum of approved typed deltas, in any order
//! - Pending and rejected movements never count
//! - Low-stock detection with threshold resolution
//! - Idempotent recording by external reference

mod common;

use chrono::Utc;
use proptest::prelude::*;
use shared::{current_stock, ApprovalStatus, InventoryMovement, MovementType, StockFilter};
use std::sync::Arc;
use uuid::Uuid;

use stock_ledger::services::{LedgerService, RecordMovementInput};
use stock_ledger::store::MemoryStore;
use stock_ledger::AppError;

// ============================================================================
// Helpers
// ============================================================================

fn input(product_id: Uuid, location_id: Uuid, kind: &str, quantity: i64) -> RecordMovementInput {
    RecordMovementInput {
        product_id,
        location_id,
        movement_type: kind.to_string(),
        quantity,
        reference: None,
        notes: None,
    }
}

async fn record_approved(
    ledger: &LedgerService,
    product_id: Uuid,
    location_id: Uuid,
    kind: &str,
    quantity: i64,
) {
    let recorded = ledger
        .record_movement(input(product_id, location_id, kind, quantity))
        .await
        .unwrap();
    ledger.approve_movement(recorded.id).await.unwrap();
}

fn movement_strategy() -> impl Strategy<Value = InventoryMovement> {
    (
        prop::sample::select(MovementType::ALL.to_vec()),
        1i64..500,
        prop_oneof![
            Just(ApprovalStatus::Pending),
            Just(ApprovalStatus::Approved),
            Just(ApprovalStatus::Rejected),
        ],
    )
        .prop_map(|(movement_type, quantity, status)| InventoryMovement {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            location_id: Uuid::nil(),
            movement_type,
            quantity,
            approval_status: status,
            approved_at: (status == ApprovalStatus::Approved).then(Utc::now),
            idempotency_key: None,
            reference: None,
            notes: None,
            archived: false,
            archived_at: None,
            created_at: Utc::now(),
        })
}

// ============================================================================
// Scenario tests
// ============================================================================

#[tokio::test]
async fn test_stock_and_low_stock_scenario() {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("P-1", Some(50));
    store.put_product(p.clone()).await;
    let ledger = LedgerService::new(store, 10);
    let location = Uuid::new_v4();

    record_approved(&ledger, p.id, location, "receiving", 100).await;
    record_approved(&ledger, p.id, location, "da_to_bins", 30).await;
    record_approved(&ledger, p.id, location, "shipping", 10).await;

    assert_eq!(ledger.current_stock(p.id, Some(location)).await.unwrap(), 60);
    let status = ledger.check_low_stock(p.id, None).await.unwrap();
    assert!(!status.is_low);
    assert_eq!(status.threshold, 50);

    record_approved(&ledger, p.id, location, "shipping", 15).await;
    assert_eq!(ledger.current_stock(p.id, Some(location)).await.unwrap(), 45);
    let status = ledger.check_low_stock(p.id, None).await.unwrap();
    assert!(status.is_low);
    assert_eq!(status.shortage, 5);

    let report = ledger.low_stock_report(None).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].sku, "P-1");
}

#[tokio::test]
async fn test_pending_movement_does_not_count_until_approved() {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("P-2", None);
    store.put_product(p.clone()).await;
    let ledger = LedgerService::new(store, 10);
    let location = Uuid::new_v4();

    let recorded = ledger
        .record_movement(input(p.id, location, "receiving", 40))
        .await
        .unwrap();
    assert_eq!(ledger.current_stock(p.id, None).await.unwrap(), 0);

    let approved = ledger.approve_movement(recorded.id).await.unwrap();
    assert_eq!(approved.approval_status, ApprovalStatus::Approved);
    assert!(approved.approved_at.is_some());
    assert_eq!(ledger.current_stock(p.id, None).await.unwrap(), 40);

    // Approving again is a no-op, rejecting an approved movement is not allowed
    ledger.approve_movement(recorded.id).await.unwrap();
    let err = ledger.reject_movement(recorded.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn test_duplicate_reference_records_once() {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("P-3", None);
    store.put_product(p.clone()).await;
    let ledger = LedgerService::new(store.clone(), 10);

    let mut first = input(p.id, Uuid::new_v4(), "receiving", 5);
    first.reference = Some("po-7781".to_string());
    let a = ledger.record_movement(first.clone()).await.unwrap();
    let b = ledger.record_movement(first).await.unwrap();

    assert!(!a.duplicate);
    assert!(b.duplicate);
    assert_eq!(a.id, b.id);
    assert_eq!(store.all_movements().await.len(), 1);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("P-4", None);
    store.put_product(p.clone()).await;
    let ledger = LedgerService::new(store.clone(), 10);

    let err = ledger
        .record_movement(input(p.id, Uuid::new_v4(), "teleport", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let err = ledger
        .record_movement(input(p.id, Uuid::new_v4(), "receiving", 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. } | AppError::ValidationError(_)));

    let err = ledger
        .record_movement(input(p.id, Uuid::new_v4(), "receiving", i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. } | AppError::ValidationError(_)));

    let err = ledger
        .record_movement(input(Uuid::new_v4(), Uuid::new_v4(), "receiving", 5))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(store.all_movements().await.is_empty());
}

#[tokio::test]
async fn test_threshold_override_wins() {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("P-5", Some(5));
    store.put_product(p.clone()).await;
    let ledger = LedgerService::new(store, 10);
    record_approved(&ledger, p.id, Uuid::new_v4(), "receiving", 20).await;

    assert!(ledger.low_stock_report(None).await.unwrap().is_empty());
    let report = ledger.low_stock_report(Some(25)).await.unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].shortage, 5);
}

// ============================================================================
// Property tests
// ============================================================================

proptest! {
    #[test]
    fn prop_projection_is_order_independent(
        movements in prop::collection::vec(movement_strategy(), 0..40),
        seed in any::<u64>(),
    ) {
        let filter = StockFilter::default();
        let forward = current_stock(&movements, &filter);

        let mut shuffled = movements.clone();
        shuffled.reverse();
        let len = shuffled.len();
        if len > 1 {
            shuffled.swap(0, (seed as usize) % len);
        }
        prop_assert_eq!(forward, current_stock(&shuffled, &filter));
    }

    #[test]
    fn prop_unapproved_movements_never_count(
        movements in prop::collection::vec(movement_strategy(), 0..40),
    ) {
        let filter = StockFilter::default();
        let approved: Vec<InventoryMovement> = movements
            .iter()
            .filter(|m| m.approval_status == ApprovalStatus::Approved)
            .cloned()
            .collect();
        prop_assert_eq!(current_stock(&movements, &filter), current_stock(&approved, &filter));
    }
}
