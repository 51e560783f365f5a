//! Conflict detection across the agent subsystem, the bin subsystem, the
//! ledger and the external inventory system

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use shared::{
    current_stock, group_conflicts, stock_mismatch_severity, Bin, BinStatus, Conflict,
    ConflictMap, ConflictSubject, ConflictType, DeliveryAgent, ExternalBinSnapshot,
    InventoryMovement, Product, StockFilter,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConflictConfig;
use crate::error::AppResult;
use crate::external::{ExternalBinItem, InventorySource};
use crate::store::SharedStore;

/// Output of one detection pass
#[derive(Debug, Clone, Serialize)]
pub struct ConflictReport {
    pub generated_at: DateTime<Utc>,
    pub conflicts: ConflictMap,
    pub total: usize,
    pub auto_resolvable: usize,
    /// Checks that could not run, e.g. an unreachable external system
    pub warnings: Vec<String>,
}

impl ConflictReport {
    pub fn new(conflicts: Vec<Conflict>, warnings: Vec<String>) -> Self {
        let total = conflicts.len();
        let auto_resolvable = conflicts.iter().filter(|c| c.auto_resolvable).count();
        Self {
            generated_at: Utc::now(),
            conflicts: group_conflicts(conflicts),
            total,
            auto_resolvable,
            warnings,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values().flatten()
    }
}

#[derive(Clone)]
pub struct ConflictDetector {
    store: SharedStore,
    source: Arc<dyn InventorySource>,
    delivery_location_id: String,
    critical_value: Decimal,
    high_quantity: i64,
}

fn subject(bin_id: Option<Uuid>, agent_id: Option<Uuid>) -> ConflictSubject {
    ConflictSubject {
        bin_id,
        agent_id,
        product_id: None,
    }
}

/// Disagreements between agent records and bin records
pub fn detect_internal(agents: &[DeliveryAgent], bins: &[Bin]) -> Vec<Conflict> {
    let agents_by_id: HashMap<Uuid, &DeliveryAgent> = agents.iter().map(|a| (a.id, a)).collect();
    let bins_by_id: HashMap<Uuid, &Bin> = bins.iter().map(|b| (b.id, b)).collect();

    let mut claimants: BTreeMap<Uuid, Vec<&DeliveryAgent>> = BTreeMap::new();
    for agent in agents {
        if let Some(bin_id) = agent.bin_id {
            claimants.entry(bin_id).or_default().push(agent);
        }
    }

    let mut conflicts = Vec::new();

    for agent in agents {
        let Some(bin_id) = agent.bin_id else { continue };
        match bins_by_id.get(&bin_id) {
            None => conflicts.push(
                Conflict::new(
                    ConflictType::AgentBinMissing,
                    subject(Some(bin_id), Some(agent.id)),
                    format!("Delivery agent {} references bin {} which does not exist", agent.name, bin_id),
                )
                .with_value("agent_subsystem", json!(bin_id))
                .with_value("bin_subsystem", serde_json::Value::Null),
            ),
            Some(bin) => {
                if let Some(bin_state) = &bin.state {
                    let agrees = agent
                        .state
                        .as_deref()
                        .is_some_and(|s| s.eq_ignore_ascii_case(bin_state));
                    if !agrees {
                        conflicts.push(
                            Conflict::new(
                                ConflictType::StateMismatch,
                                subject(Some(bin.id), Some(agent.id)),
                                format!(
                                    "Delivery agent {} is in {:?} but bin {} is in {}",
                                    agent.name, agent.state, bin.name, bin_state
                                ),
                            )
                            .with_value("agent_subsystem", json!(agent.state))
                            .with_value("bin_subsystem", json!(bin_state)),
                        );
                    }
                }
            }
        }
    }

    for bin in bins {
        let bin_claimants = claimants.get(&bin.id).map(Vec::as_slice).unwrap_or(&[]);
        let claimant_ids: Vec<Uuid> = bin_claimants.iter().map(|a| a.id).collect();

        match bin.assigned_to_da {
            Some(assigned) => {
                let Some(agent) = agents_by_id.get(&assigned) else {
                    conflicts.push(
                        Conflict::new(
                            ConflictType::OrphanBinAssignment,
                            subject(Some(bin.id), Some(assigned)),
                            format!("Bin {} is assigned to unknown delivery agent {}", bin.name, assigned),
                        )
                        .with_value("bin_subsystem", json!(assigned))
                        .with_value("agent_subsystem", serde_json::Value::Null),
                    );
                    continue;
                };

                let contested = claimant_ids.iter().any(|id| *id != assigned)
                    || agent.bin_id.is_some_and(|b| b != bin.id);
                if contested {
                    conflicts.push(
                        Conflict::new(
                            ConflictType::AssignmentMismatch,
                            subject(Some(bin.id), Some(assigned)),
                            format!(
                                "Bin {} is assigned to {} in the bin subsystem but claimed by {:?} in the agent subsystem",
                                bin.name, assigned, claimant_ids
                            ),
                        )
                        .with_value("bin_subsystem", json!(assigned))
                        .with_value("agent_subsystem", json!(claimant_ids)),
                    );
                } else if agent.bin_id.is_none() {
                    conflicts.push(
                        Conflict::new(
                            ConflictType::AgentLinkMissing,
                            subject(Some(bin.id), Some(assigned)),
                            format!("Bin {} names {} but the agent has no bin link", bin.name, agent.name),
                        )
                        .with_value("bin_subsystem", json!(assigned))
                        .with_value("agent_subsystem", serde_json::Value::Null),
                    );
                }

                if agent.status == shared::AgentStatus::Inactive {
                    conflicts.push(
                        Conflict::new(
                            ConflictType::InactiveAgentAssigned,
                            subject(Some(bin.id), Some(assigned)),
                            format!("Inactive delivery agent {} still holds bin {}", agent.name, bin.name),
                        )
                        .with_value("agent_subsystem", json!(agent.status.as_str())),
                    );
                }
            }
            None => match bin_claimants {
                [] => {}
                [agent] => conflicts.push(
                    Conflict::new(
                        ConflictType::BinLinkMissing,
                        subject(Some(bin.id), Some(agent.id)),
                        format!("Delivery agent {} claims bin {} which has no assignment", agent.name, bin.name),
                    )
                    .with_value("agent_subsystem", json!(agent.id))
                    .with_value("bin_subsystem", serde_json::Value::Null),
                ),
                _ => conflicts.push(
                    Conflict::new(
                        ConflictType::AssignmentMismatch,
                        subject(Some(bin.id), None),
                        format!("Bin {} is claimed by {} delivery agents", bin.name, claimant_ids.len()),
                    )
                    .with_value("bin_subsystem", serde_json::Value::Null)
                    .with_value("agent_subsystem", json!(claimant_ids)),
                ),
            },
        }
    }

    conflicts
}

/// Local bins missing upstream and bins whose name drifted from the external record
pub fn detect_external(bins: &[Bin], external: &[ExternalBinSnapshot]) -> Vec<Conflict> {
    let external_by_id: HashMap<&str, &ExternalBinSnapshot> =
        external.iter().map(|e| (e.zoho_bin_id.as_str(), e)).collect();

    let mut conflicts = Vec::new();
    for bin in bins {
        match external_by_id.get(bin.zoho_bin_id.as_str()) {
            None if bin.status != BinStatus::MissingUpstream => conflicts.push(
                Conflict::new(
                    ConflictType::MissingUpstream,
                    subject(Some(bin.id), bin.assigned_to_da),
                    format!("Bin {} ({}) is no longer reported upstream", bin.name, bin.zoho_bin_id),
                )
                .with_value("bin_subsystem", json!(bin.zoho_bin_id))
                .with_value("external", serde_json::Value::Null),
            ),
            None => {}
            Some(ext) if ext.bin_name != bin.name => conflicts.push(
                Conflict::new(
                    ConflictType::BinNameDrift,
                    subject(Some(bin.id), bin.assigned_to_da),
                    format!("Bin {} is named {:?} upstream", bin.name, ext.bin_name),
                )
                .with_value("bin_subsystem", json!(bin.name))
                .with_value("external", json!(ext.bin_name)),
            ),
            Some(_) => {}
        }
    }
    conflicts
}

/// Ledger projection versus external item counts for one bin
pub fn detect_stock(
    bin: &Bin,
    items: &[ExternalBinItem],
    products: &[Product],
    movements: &[InventoryMovement],
    critical_value: Decimal,
    high_quantity: i64,
) -> Vec<Conflict> {
    let by_sku: HashMap<&str, &Product> = products.iter().map(|p| (p.sku.as_str(), p)).collect();

    let mut external: BTreeMap<Uuid, i64> = BTreeMap::new();
    for item in items {
        match by_sku.get(item.sku.as_str()) {
            Some(product) => {
                let total = external.entry(product.id).or_insert(0);
                *total = total.saturating_add(item.quantity);
            }
            None => debug!(sku = %item.sku, bin = %bin.zoho_bin_id, "external item has no local product"),
        }
    }

    let ledger_products: HashSet<Uuid> = movements
        .iter()
        .filter(|m| m.location_id == bin.id)
        .map(|m| m.product_id)
        .collect();

    let products_by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.id, p)).collect();
    let mut all: Vec<Uuid> = external.keys().copied().chain(ledger_products).collect();
    all.sort_unstable();
    all.dedup();

    let mut conflicts = Vec::new();
    for product_id in all {
        let Some(product) = products_by_id.get(&product_id) else { continue };
        let ledger = current_stock(movements, &StockFilter::at(product_id, Some(bin.id)));
        let upstream = external.get(&product_id).copied().unwrap_or(0);
        let gap = ledger.saturating_sub(upstream);
        if gap == 0 {
            continue;
        }
        let severity = stock_mismatch_severity(gap, product.unit_price, critical_value, high_quantity);
        conflicts.push(
            Conflict::new(
                ConflictType::StockMismatch,
                ConflictSubject {
                    bin_id: Some(bin.id),
                    agent_id: bin.assigned_to_da,
                    product_id: Some(product_id),
                },
                format!(
                    "{} in bin {}: ledger {} vs external {}",
                    product.sku, bin.name, ledger, upstream
                ),
            )
            .with_severity(severity)
            .with_value("ledger", json!(ledger))
            .with_value("external", json!(upstream)),
        );
    }
    conflicts
}

impl ConflictDetector {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn InventorySource>,
        delivery_location_id: String,
        cfg: &ConflictConfig,
    ) -> Self {
        Self {
            store,
            source,
            delivery_location_id,
            critical_value: cfg.critical_value_threshold,
            high_quantity: cfg.high_quantity_threshold,
        }
    }

    /// Every bin the external system reports under the delivery location
    pub async fn external_snapshot(&self) -> AppResult<Vec<ExternalBinSnapshot>> {
        let zones = self
            .source
            .list_zones_for_location(&self.delivery_location_id)
            .await?;
        let mut snapshots = Vec::new();
        for zone in &zones {
            let bins = self.source.list_bins_for_zone(&zone.zone_id).await?;
            snapshots.extend(
                bins.iter()
                    .map(|b| b.snapshot(zone, &self.delivery_location_id)),
            );
        }
        Ok(snapshots)
    }

    /// Run every detection check
    ///
    /// When the external system cannot be read, the internal checks still
    /// run and the report carries a warning. Credential and throttling
    /// failures are returned as errors.
    pub async fn detect_all_conflicts(&self) -> AppResult<ConflictReport> {
        let agents = self.store.list_agents().await?;
        let bins = self.store.list_bins().await?;
        let mut warnings = Vec::new();

        let mut conflicts = detect_internal(&agents, &bins);

        match self.external_snapshot().await {
            Ok(external) => conflicts.extend(detect_external(&bins, &external)),
            Err(e) if e.aborts_sync() => return Err(e),
            Err(e) => {
                warn!(error = %e, "external presence check skipped");
                warnings.push(format!("external presence check skipped: {}", e));
            }
        }

        let products = self.store.list_products().await?;
        let movements = self.store.approved_movements(&StockFilter::default()).await?;
        for bin in bins.iter().filter(|b| b.status == BinStatus::Active) {
            match self.source.list_bin_items(&bin.zoho_bin_id).await {
                Ok(items) => conflicts.extend(detect_stock(
                    bin,
                    &items,
                    &products,
                    &movements,
                    self.critical_value,
                    self.high_quantity,
                )),
                Err(e) if e.aborts_sync() => return Err(e),
                Err(e) => {
                    warn!(bin = %bin.zoho_bin_id, error = %e, "stock check skipped");
                    warnings.push(format!("stock check skipped for bin {}: {}", bin.zoho_bin_id, e));
                }
            }
        }

        let report = ConflictReport::new(conflicts, warnings);
        info!(
            total = report.total,
            auto_resolvable = report.auto_resolvable,
            categories = report.conflicts.len(),
            "conflict detection finished"
        );
        Ok(report)
    }
}
