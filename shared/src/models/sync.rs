//! Synchronization pass models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a sync pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SyncTarget {
    /// Every zone under the delivery location
    Global,
    /// The zone backing one delivery agent's bin
    Agent(Uuid),
    /// A single bin; used for resolver writes
    Bin(Uuid),
}

impl SyncTarget {
    /// Lease and record key, e.g. `agent:1c0f...`
    pub fn key(&self) -> String {
        match self {
            SyncTarget::Global => "global".to_string(),
            SyncTarget::Agent(id) => format!("agent:{}", id),
            SyncTarget::Bin(id) => format!("bin:{}", id),
        }
    }

    pub fn parse_key(key: &str) -> Option<Self> {
        if key == "global" {
            return Some(SyncTarget::Global);
        }
        let (kind, id) = key.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "agent" => Some(SyncTarget::Agent(id)),
            "bin" => Some(SyncTarget::Bin(id)),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Mapping state of one external bin: `Discovered -> Mapped -> Synced`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStage {
    Discovered,
    Mapped,
    Synced,
}

impl SyncStage {
    pub fn advance(self) -> Self {
        match self {
            SyncStage::Discovered => SyncStage::Mapped,
            SyncStage::Mapped | SyncStage::Synced => SyncStage::Synced,
        }
    }

    /// An external change sends a synced bin back through mapping
    pub fn on_external_change(self) -> Self {
        match self {
            SyncStage::Discovered => SyncStage::Discovered,
            SyncStage::Mapped | SyncStage::Synced => SyncStage::Mapped,
        }
    }
}

/// Change the mapper decided on for one external bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannedAction {
    Create,
    Update,
    Unchanged,
}

impl PlannedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlannedAction::Create => "create",
            PlannedAction::Update => "update",
            PlannedAction::Unchanged => "unchanged",
        }
    }
}

/// Outcome for one external bin within a sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItemResult {
    pub zoho_bin_id: String,
    pub zoho_zone_id: String,
    pub action: PlannedAction,
    pub bin_id: Option<Uuid>,
    pub changed_fields: Vec<String>,
    pub inferred_state: Option<String>,
    pub stage: SyncStage,
    /// False for dry runs and for failed items
    pub applied: bool,
    pub error: Option<String>,
}

impl SyncItemResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Persisted summary of one sync pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: Uuid,
    pub target: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub created: i32,
    pub updated: i32,
    pub unchanged: i32,
    pub failed: i32,
}

impl SyncRecord {
    /// Aggregate item outcomes into a record. A pass with a pass-level error
    /// or any failed item is not successful.
    pub fn summarize(
        target: &SyncTarget,
        dry_run: bool,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        items: &[SyncItemResult],
        error: Option<String>,
    ) -> Self {
        let count = |action: PlannedAction| {
            items
                .iter()
                .filter(|i| !i.is_error() && i.action == action)
                .count() as i32
        };
        let failed = items.iter().filter(|i| i.is_error()).count() as i32;

        Self {
            id: Uuid::new_v4(),
            target: target.key(),
            dry_run,
            started_at,
            finished_at,
            success: error.is_none() && failed == 0,
            error,
            created: count(PlannedAction::Create),
            updated: count(PlannedAction::Update),
            unchanged: count(PlannedAction::Unchanged),
            failed,
        }
    }
}

/// Percentage of successful passes, `None` when there were no passes
pub fn success_rate(records: &[SyncRecord]) -> Option<f64> {
    if records.is_empty() {
        return None;
    }
    let ok = records.iter().filter(|r| r.success).count();
    Some(ok as f64 / records.len() as f64 * 100.0)
}
