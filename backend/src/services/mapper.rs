//! Mapping of external bins onto local bin records
//!
//! [`BinMapper::plan`] is the only place that decides whether an external
//! bin needs a create, an update or nothing. Dry runs stop after planning;
//! live runs hand the same plan to [`BinMapper::apply`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{infer_state, Bin, ExternalBinSnapshot, NewBin, PlannedAction};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::store::SharedStore;

/// Planned change for one external bin
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub snapshot: ExternalBinSnapshot,
    pub action: PlannedAction,
    pub existing: Option<Bin>,
    pub changed_fields: Vec<String>,
    /// State derived from the zone name; advisory only
    pub inferred_state: Option<String>,
}

impl PlannedChange {
    /// State the bin will carry once the change is applied
    pub fn effective_state(&self) -> Option<&str> {
        self.existing
            .as_ref()
            .and_then(|b| b.state.as_deref())
            .or(self.inferred_state.as_deref())
    }
}

#[derive(Clone)]
pub struct BinMapper {
    store: SharedStore,
}

/// Best-effort state inference with an audit log line for every attempt
pub fn infer_state_logged(zone_name: &str) -> Option<String> {
    let inferred = infer_state(zone_name);
    info!(zone_name = %zone_name, inferred_state = ?inferred, "state inferred from zone name");
    inferred.map(str::to_string)
}

impl BinMapper {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn plan(&self, snapshot: ExternalBinSnapshot) -> AppResult<PlannedChange> {
        shared::validate_external_id(&snapshot.zoho_bin_id)
            .map_err(|msg| AppError::Mapping(format!("bin id {:?}: {}", snapshot.zoho_bin_id, msg)))?;
        shared::validate_external_id(&snapshot.zoho_zone_id).map_err(|msg| {
            AppError::Mapping(format!("zone id {:?}: {}", snapshot.zoho_zone_id, msg))
        })?;

        let existing = self.store.find_bin_by_zoho_id(&snapshot.zoho_bin_id).await?;

        let change = match existing {
            None => PlannedChange {
                inferred_state: infer_state_logged(&snapshot.zone_name),
                action: PlannedAction::Create,
                existing: None,
                changed_fields: Vec::new(),
                snapshot,
            },
            Some(bin) => {
                let mut changed_fields: Vec<String> = bin
                    .drift_from(&snapshot)
                    .fields
                    .into_iter()
                    .map(str::to_string)
                    .collect();

                // A bin created before its zone could be placed may gain a state later
                let inferred_state = if bin.state.is_none() {
                    infer_state_logged(&snapshot.zone_name)
                } else {
                    None
                };
                if inferred_state.is_some() {
                    changed_fields.push("state".to_string());
                }

                let action = if changed_fields.is_empty() {
                    PlannedAction::Unchanged
                } else {
                    PlannedAction::Update
                };
                PlannedChange {
                    snapshot,
                    action,
                    existing: Some(bin),
                    changed_fields,
                    inferred_state,
                }
            }
        };

        debug!(
            zoho_bin_id = %change.snapshot.zoho_bin_id,
            action = change.action.as_str(),
            changed = ?change.changed_fields,
            "bin change planned"
        );
        Ok(change)
    }

    /// Write a planned change; each call commits on its own
    pub async fn apply(&self, change: &PlannedChange, now: DateTime<Utc>) -> AppResult<Bin> {
        match (&change.action, &change.existing) {
            (PlannedAction::Create, _) => {
                let new_bin =
                    NewBin::from_external(&change.snapshot, change.inferred_state.as_deref());
                self.store.create_bin(&new_bin, now).await
            }
            (_, Some(existing)) => {
                let mut bin = existing.clone();
                bin.apply_external(&change.snapshot, now);
                if bin.state.is_none() {
                    bin.state = change.inferred_state.clone();
                }
                self.store.update_bin(&bin).await?;
                Ok(bin)
            }
            (_, None) => Err(AppError::Mapping(format!(
                "No local bin for external bin {}",
                change.snapshot.zoho_bin_id
            ))),
        }
    }
}
