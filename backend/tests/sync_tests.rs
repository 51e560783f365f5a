//! Bin synchronization tests against a scripted external system

mod common;

use common::{Failure, FakeSource, Harness};
use shared::{BinStatus, PlannedAction, StateFilter, SyncTarget};
use tokio_util::sync::CancellationToken;

use stock_ledger::services::SyncRequest;
use stock_ledger::store::{BinStore, SyncRecordStore};
use stock_ledger::AppError;

fn since_epoch() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() - chrono::Duration::days(1)
}

#[tokio::test]
async fn test_dry_run_reports_pending_create_without_writing() {
    let h = Harness::new(FakeSource::new().with_bin("ZN1", "Lagos Island", "Z123", "Bin Z123"));
    let orchestrator = h.orchestrator();
    let cancel = CancellationToken::new();

    let dry = orchestrator
        .sync_bins(&SyncRequest::global(true), &cancel)
        .await
        .unwrap();
    assert_eq!(dry.creates(), vec!["Z123"]);
    assert!(h.store.list_bins().await.unwrap().is_empty());
    assert!(dry.record.dry_run);

    let live = orchestrator
        .sync_bins(&SyncRequest::global(false), &cancel)
        .await
        .unwrap();
    assert_eq!(live.creates(), dry.creates());
    assert_eq!(live.updates(), dry.updates());

    let bins = h.store.list_bins().await.unwrap();
    assert_eq!(bins.len(), 1);
    assert_eq!(bins[0].zoho_bin_id, "Z123");
    assert_eq!(bins[0].state.as_deref(), Some("Lagos"));
    assert!(bins[0].last_synced_at.is_some());

    // Second live pass over the same snapshot creates nothing
    let again = orchestrator
        .sync_bins(&SyncRequest::global(false), &cancel)
        .await
        .unwrap();
    assert!(again.creates().is_empty());
    assert_eq!(again.record.unchanged, 1);
    assert_eq!(h.store.list_bins().await.unwrap().len(), 1);

    let records = h.store.sync_records_since(since_epoch()).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.success));
}

#[tokio::test]
async fn test_dry_and_live_agree_on_updates() {
    let h = Harness::new(
        FakeSource::new()
            .with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin")
            .with_bin("ZN2", "Lagos Island", "ZB2", "Lagos Bin"),
    );
    let orchestrator = h.orchestrator();
    let cancel = CancellationToken::new();
    orchestrator
        .sync_bins(&SyncRequest::global(false), &cancel)
        .await
        .unwrap();

    h.source.rename_bin("ZB1", "Kano Bin North");
    h.source.add_bin("ZN3", "Rivers Port Harcourt", "ZB3", "Rivers Bin");

    let dry = orchestrator
        .sync_bins(&SyncRequest::global(true), &cancel)
        .await
        .unwrap();
    let live = orchestrator
        .sync_bins(&SyncRequest::global(false), &cancel)
        .await
        .unwrap();

    assert_eq!(dry.creates(), vec!["ZB3"]);
    assert_eq!(dry.updates(), vec!["ZB1"]);
    assert_eq!(live.creates(), dry.creates());
    assert_eq!(live.updates(), dry.updates());

    let renamed = h.store.find_bin_by_zoho_id("ZB1").await.unwrap().unwrap();
    assert_eq!(renamed.name, "Kano Bin North");
}

#[tokio::test]
async fn test_state_filter_limits_items() {
    let h = Harness::new(
        FakeSource::new()
            .with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin")
            .with_bin("ZN2", "Lagos Island", "ZB2", "Lagos Bin"),
    );
    let request = SyncRequest {
        target: SyncTarget::Global,
        dry_run: false,
        state_filter: StateFilter::Only("Kano".to_string()),
    };
    let outcome = h
        .orchestrator()
        .sync_bins(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.creates(), vec!["ZB1"]);
    assert_eq!(h.store.list_bins().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_external_id_is_collected_per_item() {
    let h = Harness::new(
        FakeSource::new()
            .with_bin("ZN1", "Kano Central", "bad id!", "Broken")
            .with_bin("ZN2", "Lagos Island", "ZB2", "Lagos Bin"),
    );
    let outcome = h
        .orchestrator()
        .sync_bins(&SyncRequest::global(false), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.record.failed, 1);
    assert_eq!(outcome.record.created, 1);
    assert!(!outcome.record.success);
    let failed: Vec<_> = outcome.items.iter().filter(|i| i.is_error()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].zoho_bin_id, "bad id!");
}

#[tokio::test]
async fn test_auth_failure_aborts_and_is_recorded() {
    let h = Harness::new(FakeSource::new().with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin"));
    h.source.fail_with(Failure::Auth);

    for dry_run in [true, false] {
        let err = h
            .orchestrator()
            .sync_bins(&SyncRequest::global(dry_run), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    let records = h.store.sync_records_since(since_epoch()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| !r.success && r.error.is_some()));
    assert!(h.store.list_bins().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_pass_keeps_completed_writes() {
    let h = Harness::new(FakeSource::new().with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .orchestrator()
        .sync_bins(&SyncRequest::global(false), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled));
    assert!(h.store.list_bins().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_live_pass_on_same_target_is_refused() {
    let h = Harness::new(FakeSource::new().with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin"));
    let _held = h.leases.acquire(&SyncTarget::Global).unwrap();

    let err = h
        .orchestrator()
        .sync_bins(&SyncRequest::global(false), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::LockContention(_)));

    // A dry run needs no lease
    let dry = h
        .orchestrator()
        .sync_bins(&SyncRequest::global(true), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(dry.items[0].action, PlannedAction::Create);
}

#[tokio::test]
async fn test_agent_target_syncs_only_its_zone() {
    let h = Harness::new(
        FakeSource::new()
            .with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin")
            .with_bin("ZN2", "Lagos Island", "ZB2", "Lagos Bin"),
    );
    h.orchestrator()
        .sync_bins(&SyncRequest::global(false), &CancellationToken::new())
        .await
        .unwrap();
    let kano = h.store.find_bin_by_zoho_id("ZB1").await.unwrap().unwrap();
    let da = common::agent("Musa", Some(kano.id), Some("Kano"));
    h.memory.put_agent(da.clone()).await;

    h.source.rename_bin("ZB1", "Kano Bin 2");
    h.source.rename_bin("ZB2", "Lagos Bin 2");

    let request = SyncRequest {
        target: SyncTarget::Agent(da.id),
        dry_run: false,
        state_filter: StateFilter::All,
    };
    let outcome = h
        .orchestrator()
        .sync_bins(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.updates(), vec!["ZB1"]);
    let lagos = h.store.find_bin_by_zoho_id("ZB2").await.unwrap().unwrap();
    assert_eq!(lagos.name, "Lagos Bin");
}

#[tokio::test]
async fn test_bin_missing_upstream_comes_back_active() {
    let h = Harness::new(FakeSource::new().with_bin("ZN1", "Kano Central", "ZB1", "Kano Bin"));
    h.orchestrator()
        .sync_bins(&SyncRequest::global(false), &CancellationToken::new())
        .await
        .unwrap();
    let mut bin = h.store.find_bin_by_zoho_id("ZB1").await.unwrap().unwrap();
    bin.status = BinStatus::MissingUpstream;
    h.store.update_bin(&bin).await.unwrap();

    let outcome = h
        .orchestrator()
        .sync_bins(&SyncRequest::global(false), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.updates(), vec!["ZB1"]);
    let bin = h.store.find_bin_by_zoho_id("ZB1").await.unwrap().unwrap();
    assert_eq!(bin.status, BinStatus::Active);
}
