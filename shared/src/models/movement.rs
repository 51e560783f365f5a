//! Inventory movement ledger models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Kind of inventory movement.
///
/// The set is closed: every variant carries a fixed [`Direction`], so a
/// movement can never contribute an ambiguous delta to stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Goods received from a supplier into a warehouse location
    Receiving,
    /// Transfer received from another delivery agent
    DaToDa,
    /// Goods moved out of an agent's holding into bins
    DaToBins,
    /// Goods shipped out to a customer
    Shipping,
}

/// Effect of a movement on the stock of its location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Inbound => 1,
            Direction::Outbound => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized movement type: {0}")]
pub struct UnknownMovementType(pub String);

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Receiving,
        MovementType::DaToDa,
        MovementType::DaToBins,
        MovementType::Shipping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Receiving => "receiving",
            MovementType::DaToDa => "da_to_da",
            MovementType::DaToBins => "da_to_bins",
            MovementType::Shipping => "shipping",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MovementType::Receiving | MovementType::DaToDa => Direction::Inbound,
            MovementType::DaToBins | MovementType::Shipping => Direction::Outbound,
        }
    }

    /// Signed stock delta for a positive quantity of this movement type
    pub fn signed(&self, quantity: i64) -> i64 {
        self.direction().sign() * quantity
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = UnknownMovementType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownMovementType(s.to_string()))
    }
}

/// Approval state of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Only pending movements may be decided; a decision is final.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self, next),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
        )
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(format!("unrecognized approval status: {}", other)),
        }
    }
}

/// A single immutable entry in the movement ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Bin or agent holding the stock this movement affects
    pub location_id: Uuid,
    pub movement_type: MovementType,
    /// Always positive; the sign comes from `movement_type`
    pub quantity: i64,
    pub approval_status: ApprovalStatus,
    pub approved_at: Option<DateTime<Utc>>,
    /// Hash of the external event reference, unique across the ledger
    pub idempotency_key: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// Whether this movement participates in stock projections
    pub fn counts_toward_stock(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved && self.approved_at.is_some()
    }

    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed(self.quantity)
    }

    /// Archival eligibility: approved before `cutoff` and not yet archived
    pub fn is_archival_eligible(&self, cutoff: DateTime<Utc>) -> bool {
        !self.archived
            && self.approval_status == ApprovalStatus::Approved
            && self.approved_at.map(|at| at < cutoff).unwrap_or(false)
    }
}

/// Largest quantity a single movement may carry
pub const MAX_MOVEMENT_QUANTITY: i64 = 1_000_000_000;

/// Input for appending a movement to the ledger
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub location_id: Uuid,
    pub movement_type: MovementType,
    #[validate(range(min = 1, max = 1000000000, message = "Quantity must be between 1 and 1000000000"))]
    pub quantity: i64,
    /// External event reference used to derive the idempotency key
    #[validate(length(min = 1, max = 255))]
    pub reference: Option<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Ledger row counts used for archival audit trails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub total: i64,
    pub archived: i64,
}
