//! Ledger archival tests

mod common;

use chrono::{Duration, Utc};
use proptest::prelude::*;
use shared::{ApprovalStatus, InventoryMovement, MovementType, StockFilter};
use std::sync::Arc;
use uuid::Uuid;

use stock_ledger::services::ArchivalService;
use stock_ledger::store::{LedgerStore, MemoryStore};

fn movement(product_id: Uuid, status: ApprovalStatus, days_ago: i64) -> InventoryMovement {
    let at = Utc::now() - Duration::days(days_ago);
    InventoryMovement {
        id: Uuid::new_v4(),
        product_id,
        location_id: Uuid::nil(),
        movement_type: MovementType::Receiving,
        quantity: 3,
        approval_status: status,
        approved_at: (status == ApprovalStatus::Approved).then_some(at),
        idempotency_key: None,
        reference: None,
        notes: None,
        archived: false,
        archived_at: None,
        created_at: at,
    }
}

async fn seeded() -> (Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let p = common::product("ARC-1", None);
    store.put_product(p.clone()).await;
    for days in [400, 380, 200, 10] {
        store.put_movement(movement(p.id, ApprovalStatus::Approved, days)).await;
    }
    store.put_movement(movement(p.id, ApprovalStatus::Pending, 500)).await;
    store.put_movement(movement(p.id, ApprovalStatus::Rejected, 500)).await;
    (store, p.id)
}

#[tokio::test]
async fn test_archive_flags_only_old_approved_movements() {
    let (store, product_id) = seeded().await;
    let service = ArchivalService::new(store.clone(), 1);
    let cutoff = Utc::now() - Duration::days(365);
    let stock_before = store
        .approved_movements(&StockFilter::product(product_id))
        .await
        .unwrap();

    let report = service.archive_older_than(cutoff, false).await.unwrap();
    assert_eq!(report.eligible, 2);
    assert_eq!(report.archived, 2);
    assert_eq!(report.batches, 2);
    assert_eq!(report.before.total, 6);
    assert_eq!(report.after.total, 6);
    assert_eq!(report.after.archived, 2);

    let stock_after = store
        .approved_movements(&StockFilter::product(product_id))
        .await
        .unwrap();
    assert_eq!(
        shared::current_stock(&stock_before, &StockFilter::product(product_id)),
        shared::current_stock(&stock_after, &StockFilter::product(product_id))
    );
}

#[tokio::test]
async fn test_archive_twice_is_idempotent() {
    let (store, _) = seeded().await;
    let service = ArchivalService::new(store.clone(), 500);
    let cutoff = Utc::now() - Duration::days(100);

    let first = service.archive_older_than(cutoff, false).await.unwrap();
    let second = service.archive_older_than(cutoff, false).await.unwrap();
    assert_eq!(first.archived, 3);
    assert_eq!(second.archived, 0);
    assert_eq!(second.eligible, 0);
    assert_eq!(second.after, first.after);
}

#[tokio::test]
async fn test_dry_run_counts_like_live_run() {
    let (store, _) = seeded().await;
    let service = ArchivalService::new(store.clone(), 500);
    let cutoff = Utc::now() - Duration::days(100);

    let dry = service.archive_older_than(cutoff, true).await.unwrap();
    assert_eq!(dry.archived, 0);
    assert_eq!(dry.after.archived, 0);

    let live = service.archive_older_than(cutoff, false).await.unwrap();
    assert_eq!(dry.eligible, live.eligible);
    assert_eq!(live.archived as i64, live.eligible);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_archival_never_shrinks_the_ledger(
        ages in prop::collection::vec((0i64..800, any::<bool>()), 0..30),
        cutoff_days in 0i64..800,
        batch in 1i64..10,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let product_id = Uuid::new_v4();
            for (days, approved) in &ages {
                let status = if *approved { ApprovalStatus::Approved } else { ApprovalStatus::Pending };
                store.put_movement(movement(product_id, status, *days)).await;
            }
            let service = ArchivalService::new(store.clone(), batch);
            let report = service
                .archive_older_than(Utc::now() - Duration::days(cutoff_days), false)
                .await
                .unwrap();
            assert_eq!(report.before.total, ages.len() as i64);
            assert_eq!(report.after.total, ages.len() as i64);
            assert_eq!(report.archived as i64, report.eligible);
        });
    }
}
