//! Bin and external bin snapshot models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle flag of a bin; bins are never deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinStatus {
    Active,
    Inactive,
    /// Present locally but no longer reported by the external system
    MissingUpstream,
}

impl BinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinStatus::Active => "active",
            BinStatus::Inactive => "inactive",
            BinStatus::MissingUpstream => "missing_upstream",
        }
    }
}

impl std::str::FromStr for BinStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BinStatus::Active),
            "inactive" => Ok(BinStatus::Inactive),
            "missing_upstream" => Ok(BinStatus::MissingUpstream),
            other => Err(format!("unrecognized bin status: {}", other)),
        }
    }
}

/// A physical storage location mapped onto an external zone/bin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bin {
    pub id: Uuid,
    pub zoho_bin_id: String,
    pub zoho_zone_id: String,
    pub zoho_location_id: String,
    pub name: String,
    pub zone_name: String,
    pub state: Option<String>,
    pub assigned_to_da: Option<Uuid>,
    pub status: BinStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Normalized view of one bin as reported by the external inventory system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalBinSnapshot {
    pub zoho_bin_id: String,
    pub zoho_zone_id: String,
    pub zoho_location_id: String,
    pub bin_name: String,
    pub zone_name: String,
}

/// Values for a bin about to be created by sync
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBin {
    pub zoho_bin_id: String,
    pub zoho_zone_id: String,
    pub zoho_location_id: String,
    pub name: String,
    pub zone_name: String,
    pub state: Option<String>,
}

impl NewBin {
    pub fn from_external(external: &ExternalBinSnapshot, state: Option<&str>) -> Self {
        Self {
            zoho_bin_id: external.zoho_bin_id.clone(),
            zoho_zone_id: external.zoho_zone_id.clone(),
            zoho_location_id: external.zoho_location_id.clone(),
            name: external.bin_name.clone(),
            zone_name: external.zone_name.clone(),
            state: state.map(str::to_string),
        }
    }
}

/// Metadata fields that differ between a local bin and its external record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinDrift {
    pub fields: Vec<&'static str>,
}

impl Bin {
    /// Fields whose local value disagrees with the external record
    pub fn drift_from(&self, external: &ExternalBinSnapshot) -> BinDrift {
        let mut fields = Vec::new();
        if self.name != external.bin_name {
            fields.push("name");
        }
        if self.zone_name != external.zone_name {
            fields.push("zone_name");
        }
        if self.zoho_zone_id != external.zoho_zone_id {
            fields.push("zoho_zone_id");
        }
        if self.zoho_location_id != external.zoho_location_id {
            fields.push("zoho_location_id");
        }
        if self.status == BinStatus::MissingUpstream {
            fields.push("status");
        }
        BinDrift { fields }
    }

    /// Adopt the external record's metadata; the external system is authoritative
    pub fn apply_external(&mut self, external: &ExternalBinSnapshot, now: DateTime<Utc>) {
        self.name = external.bin_name.clone();
        self.zone_name = external.zone_name.clone();
        self.zoho_zone_id = external.zoho_zone_id.clone();
        self.zoho_location_id = external.zoho_location_id.clone();
        if self.status == BinStatus::MissingUpstream {
            self.status = BinStatus::Active;
        }
        self.last_synced_at = Some(now);
        self.updated_at = now;
    }
}

impl BinDrift {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
