//! Sync orchestration against the external inventory system
//!
//! A pass fetches the zones of the delivery location, the bins of each zone,
//! plans a change per bin and, unless it is a dry run, applies it. Each bin
//! write commits individually so a cancelled or aborted pass leaves every
//! completed write in place and nothing half-written.

use chrono::Utc;
use serde::Serialize;
use shared::{
    ExternalBinSnapshot, PlannedAction, StateFilter, SyncItemResult, SyncRecord, SyncStage,
    SyncTarget,
};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::lease::LeaseRegistry;
use super::mapper::{BinMapper, PlannedChange};
use super::queue::SyncQueue;
use crate::error::{AppError, AppResult};
use crate::external::{ExternalZone, InventorySource};
use crate::store::SharedStore;

#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub target: SyncTarget,
    pub dry_run: bool,
    pub state_filter: StateFilter,
}

impl SyncRequest {
    pub fn global(dry_run: bool) -> Self {
        Self {
            target: SyncTarget::Global,
            dry_run,
            state_filter: StateFilter::All,
        }
    }
}

/// Result of one pass
#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub record: SyncRecord,
    pub items: Vec<SyncItemResult>,
    pub warnings: Vec<String>,
}

impl SyncOutcome {
    /// External ids a pass created or would create
    pub fn creates(&self) -> Vec<&str> {
        self.ids_for(PlannedAction::Create)
    }

    pub fn updates(&self) -> Vec<&str> {
        self.ids_for(PlannedAction::Update)
    }

    fn ids_for(&self, action: PlannedAction) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .items
            .iter()
            .filter(|i| !i.is_error() && i.action == action)
            .map(|i| i.zoho_bin_id.as_str())
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// A snapshot or the reason the zone could not be read
enum Discovered {
    Bin(ExternalBinSnapshot),
    ZoneError { zone_id: String, error: AppError },
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    store: SharedStore,
    source: Arc<dyn InventorySource>,
    leases: LeaseRegistry,
    mapper: BinMapper,
    delivery_location_id: String,
}

/// Run `fut` unless `cancel` fires first
async fn cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled),
        result = fut => result,
    }
}

impl SyncOrchestrator {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn InventorySource>,
        leases: LeaseRegistry,
        delivery_location_id: String,
    ) -> Self {
        Self {
            mapper: BinMapper::new(store.clone()),
            store,
            source,
            leases,
            delivery_location_id,
        }
    }

    pub fn source(&self) -> &Arc<dyn InventorySource> {
        &self.source
    }

    /// Run one pass for `request.target`
    ///
    /// Per-item failures are collected into the outcome. Credential and
    /// throttling failures abort the pass; the record is still written
    /// before the error is returned.
    pub async fn sync_bins(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> AppResult<SyncOutcome> {
        // Dry runs write nothing and need no lease
        let _lease = if request.dry_run {
            None
        } else {
            Some(self.leases.acquire(&request.target)?)
        };

        let started_at = Utc::now();
        info!(sync_target = %request.target, dry_run = request.dry_run, "sync pass started");

        let mut items = Vec::new();
        let mut warnings = Vec::new();
        let result = self
            .run_pass(request, cancel, &mut items, &mut warnings)
            .await;

        let pass_error = result.err();
        let record = SyncRecord::summarize(
            &request.target,
            request.dry_run,
            started_at,
            Utc::now(),
            &items,
            pass_error.as_ref().map(|e| e.to_string()),
        );
        self.store.insert_sync_record(&record).await?;

        info!(
            sync_target = %request.target,
            dry_run = request.dry_run,
            success = record.success,
            created = record.created,
            updated = record.updated,
            unchanged = record.unchanged,
            failed = record.failed,
            "sync pass finished"
        );

        match pass_error {
            Some(e) => {
                error!(sync_target = %request.target, error = %e, "sync pass aborted");
                Err(e)
            }
            None => Ok(SyncOutcome {
                record,
                items,
                warnings,
            }),
        }
    }

    async fn run_pass(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
        items: &mut Vec<SyncItemResult>,
        warnings: &mut Vec<String>,
    ) -> AppResult<()> {
        let discovered = self.discover(&request.target, cancel, warnings).await?;

        for entry in discovered {
            // Checked between items; in-flight writes always complete
            if cancel.is_cancelled() {
                warn!(sync_target = %request.target, processed = items.len(), "sync pass cancelled");
                return Err(AppError::Cancelled);
            }

            match entry {
                Discovered::ZoneError { zone_id, error } => {
                    if error.aborts_sync() {
                        return Err(error);
                    }
                    warn!(zone_id = %zone_id, error = %error, "zone could not be read");
                    items.push(failed_item(String::new(), zone_id, &error));
                }
                Discovered::Bin(snapshot) => {
                    let zoho_bin_id = snapshot.zoho_bin_id.clone();
                    let zoho_zone_id = snapshot.zoho_zone_id.clone();
                    match self.sync_one(snapshot, request).await {
                        Ok(Some(item)) => items.push(item),
                        Ok(None) => {}
                        Err(e) if e.aborts_sync() => return Err(e),
                        Err(e) => {
                            warn!(zoho_bin_id = %zoho_bin_id, error = %e, "bin sync failed");
                            items.push(failed_item(zoho_bin_id, zoho_zone_id, &e));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Plan and, on live runs, apply one bin. `None` when the state filter excludes it.
    async fn sync_one(
        &self,
        snapshot: ExternalBinSnapshot,
        request: &SyncRequest,
    ) -> AppResult<Option<SyncItemResult>> {
        let change = self.mapper.plan(snapshot).await?;
        if !request.state_filter.matches(change.effective_state()) {
            return Ok(None);
        }

        let planned_stage = match change.action {
            PlannedAction::Create => SyncStage::Discovered.advance(),
            PlannedAction::Update => SyncStage::Synced.on_external_change(),
            PlannedAction::Unchanged => SyncStage::Synced,
        };

        if request.dry_run {
            return Ok(Some(item_from(&change, None, planned_stage, false)));
        }

        let bin = self.apply_with_bin_lease(&change, &request.target).await?;
        info!(
            zoho_bin_id = %change.snapshot.zoho_bin_id,
            bin_id = %bin.id,
            action = change.action.as_str(),
            changed = ?change.changed_fields,
            "bin synced"
        );
        Ok(Some(item_from(&change, Some(bin.id), planned_stage.advance(), true)))
    }

    async fn apply_with_bin_lease(
        &self,
        change: &PlannedChange,
        pass_target: &SyncTarget,
    ) -> AppResult<shared::Bin> {
        // A single-bin pass already holds this bin's lease
        let _bin_lease = match &change.existing {
            Some(bin) if *pass_target != SyncTarget::Bin(bin.id) => {
                Some(self.leases.acquire(&SyncTarget::Bin(bin.id))?)
            }
            _ => None,
        };
        self.mapper.apply(change, Utc::now()).await
    }

    async fn discover(
        &self,
        target: &SyncTarget,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> AppResult<Vec<Discovered>> {
        let location_id = self.delivery_location_id.as_str();
        let zones = cancellable(cancel, self.source.list_zones_for_location(location_id)).await?;

        let zones: Vec<ExternalZone> = match target {
            SyncTarget::Global => zones,
            SyncTarget::Agent(agent_id) => {
                let agent = self
                    .store
                    .get_agent(*agent_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Delivery agent".to_string()))?;
                let bin_id = agent.bin_id.ok_or_else(|| {
                    AppError::Mapping(format!("Delivery agent {} has no bin", agent.id))
                })?;
                self.zones_for_bin(bin_id, zones).await?
            }
            SyncTarget::Bin(bin_id) => self.zones_for_bin(*bin_id, zones).await?,
        };

        let mut discovered = Vec::new();
        for zone in &zones {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            match cancellable(cancel, self.source.list_bins_for_zone(&zone.zone_id)).await {
                Ok(bins) => {
                    if bins.len() > 1 {
                        let msg = format!(
                            "zone {} ({}) has {} bins, expected one",
                            zone.zone_id,
                            zone.zone_name,
                            bins.len()
                        );
                        warn!(zone_id = %zone.zone_id, bins = bins.len(), "zone has more than one bin");
                        warnings.push(msg);
                    }
                    discovered.extend(
                        bins.iter()
                            .map(|b| Discovered::Bin(b.snapshot(zone, location_id))),
                    );
                }
                Err(e) if e.aborts_sync() => return Err(e),
                Err(error) => discovered.push(Discovered::ZoneError {
                    zone_id: zone.zone_id.clone(),
                    error,
                }),
            }
        }
        Ok(discovered)
    }

    async fn zones_for_bin(
        &self,
        bin_id: uuid::Uuid,
        zones: Vec<ExternalZone>,
    ) -> AppResult<Vec<ExternalZone>> {
        let bin = self
            .store
            .get_bin(bin_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bin".to_string()))?;
        let zone: Vec<ExternalZone> = zones
            .into_iter()
            .filter(|z| z.zone_id == bin.zoho_zone_id)
            .collect();
        if zone.is_empty() {
            return Err(AppError::Mapping(format!(
                "Zone {} of bin {} is not reported upstream",
                bin.zoho_zone_id, bin.zoho_bin_id
            )));
        }
        Ok(zone)
    }

    /// Run queued jobs until the queue is empty or `cancel` fires
    pub async fn drain_queue(
        &self,
        queue: &SyncQueue,
        cancel: &CancellationToken,
    ) -> Vec<(SyncTarget, AppResult<SyncRecord>)> {
        let mut results = Vec::new();
        while !cancel.is_cancelled() {
            let Some((target, attempts)) = queue.take_next() else {
                break;
            };
            let request = SyncRequest {
                target,
                dry_run: false,
                state_filter: StateFilter::All,
            };
            match self.sync_bins(&request, cancel).await {
                Ok(outcome) => {
                    if !outcome.record.success {
                        queue.mark_failed(
                            target,
                            attempts + 1,
                            format!("{} items failed", outcome.record.failed),
                        );
                    }
                    results.push((target, Ok(outcome.record)));
                }
                Err(e) => {
                    queue.mark_failed(target, attempts + 1, e.to_string());
                    results.push((target, Err(e)));
                }
            }
        }
        results
    }
}

fn item_from(
    change: &PlannedChange,
    bin_id: Option<uuid::Uuid>,
    stage: SyncStage,
    applied: bool,
) -> SyncItemResult {
    SyncItemResult {
        zoho_bin_id: change.snapshot.zoho_bin_id.clone(),
        zoho_zone_id: change.snapshot.zoho_zone_id.clone(),
        action: change.action,
        bin_id: bin_id.or_else(|| change.existing.as_ref().map(|b| b.id)),
        changed_fields: change.changed_fields.clone(),
        inferred_state: change.inferred_state.clone(),
        stage,
        applied,
        error: None,
    }
}

fn failed_item(zoho_bin_id: String, zoho_zone_id: String, error: &AppError) -> SyncItemResult {
    SyncItemResult {
        zoho_bin_id,
        zoho_zone_id,
        action: PlannedAction::Unchanged,
        bin_id: None,
        changed_fields: Vec::new(),
        inferred_state: None,
        stage: SyncStage::Discovered,
        applied: false,
        error: Some(error.to_string()),
    }
}
