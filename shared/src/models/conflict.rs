//! Cross-system conflict models and severity rules

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Conflict grouping used in reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictCategory {
    AgentState,
    StockCount,
    Assignment,
    Metadata,
    ExternalPresence,
}

impl ConflictCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictCategory::AgentState => "agent_state",
            ConflictCategory::StockCount => "stock_count",
            ConflictCategory::Assignment => "assignment",
            ConflictCategory::Metadata => "metadata",
            ConflictCategory::ExternalPresence => "external_presence",
        }
    }
}

/// Ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Specific disagreement between the agent subsystem, the bin subsystem,
/// the ledger and the external system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Agent points at a bin the bin subsystem does not have
    AgentBinMissing,
    /// Bin is assigned to an agent the agent subsystem does not have
    OrphanBinAssignment,
    /// Agent and its bin disagree on the geographic state
    StateMismatch,
    /// Inactive agent still holds a bin assignment
    InactiveAgentAssigned,
    /// Ledger projection and external item count differ
    StockMismatch,
    /// Bin assigned to one agent while another agent claims it
    AssignmentMismatch,
    /// Bin names an agent that has no bin link
    AgentLinkMissing,
    /// Agent names a bin that carries no agent assignment
    BinLinkMissing,
    /// Local bin no longer reported by the external system
    MissingUpstream,
    /// Local bin name drifted from the external name
    BinNameDrift,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::AgentBinMissing => "agent_bin_missing",
            ConflictType::OrphanBinAssignment => "orphan_bin_assignment",
            ConflictType::StateMismatch => "state_mismatch",
            ConflictType::InactiveAgentAssigned => "inactive_agent_assigned",
            ConflictType::StockMismatch => "stock_mismatch",
            ConflictType::AssignmentMismatch => "assignment_mismatch",
            ConflictType::AgentLinkMissing => "agent_link_missing",
            ConflictType::BinLinkMissing => "bin_link_missing",
            ConflictType::MissingUpstream => "missing_upstream",
            ConflictType::BinNameDrift => "bin_name_drift",
        }
    }

    pub fn category(&self) -> ConflictCategory {
        match self {
            ConflictType::AgentBinMissing
            | ConflictType::OrphanBinAssignment
            | ConflictType::StateMismatch
            | ConflictType::InactiveAgentAssigned => ConflictCategory::AgentState,
            ConflictType::StockMismatch => ConflictCategory::StockCount,
            ConflictType::AssignmentMismatch
            | ConflictType::AgentLinkMissing
            | ConflictType::BinLinkMissing => ConflictCategory::Assignment,
            ConflictType::BinNameDrift => ConflictCategory::Metadata,
            ConflictType::MissingUpstream => ConflictCategory::ExternalPresence,
        }
    }

    /// Whether a deterministic, side-effect-safe resolution exists
    pub fn auto_resolvable(&self) -> bool {
        match self {
            ConflictType::OrphanBinAssignment
            | ConflictType::StateMismatch
            | ConflictType::AgentLinkMissing
            | ConflictType::BinLinkMissing
            | ConflictType::MissingUpstream
            | ConflictType::BinNameDrift => true,
            ConflictType::AgentBinMissing
            | ConflictType::InactiveAgentAssigned
            | ConflictType::StockMismatch
            | ConflictType::AssignmentMismatch => false,
        }
    }

    /// Fixed severity; stock mismatches are graded by [`stock_mismatch_severity`]
    pub fn base_severity(&self) -> Severity {
        match self {
            ConflictType::AgentBinMissing | ConflictType::AssignmentMismatch => Severity::High,
            ConflictType::OrphanBinAssignment
            | ConflictType::StateMismatch
            | ConflictType::AgentLinkMissing
            | ConflictType::BinLinkMissing
            | ConflictType::MissingUpstream
            | ConflictType::InactiveAgentAssigned => Severity::Medium,
            ConflictType::StockMismatch => Severity::Medium,
            ConflictType::BinNameDrift => Severity::Low,
        }
    }
}

/// Severity of a stock-count divergence
///
/// A divergence worth at least `critical_value` is critical; otherwise a
/// unit gap of at least `high_quantity` is high; any other gap is medium.
pub fn stock_mismatch_severity(
    quantity_gap: i64,
    unit_price: Decimal,
    critical_value: Decimal,
    high_quantity: i64,
) -> Severity {
    let gap = quantity_gap.unsigned_abs();
    // A value too large to represent is past any threshold
    let value = Decimal::from(gap).checked_mul(unit_price.abs());
    if value.map_or(true, |v| v >= critical_value) {
        Severity::Critical
    } else if gap >= high_quantity.max(0).unsigned_abs() {
        Severity::High
    } else {
        Severity::Medium
    }
}

/// Entities a conflict refers to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictSubject {
    pub bin_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
}

/// One detected disagreement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub category: ConflictCategory,
    pub conflict_type: ConflictType,
    pub description: String,
    pub severity: Severity,
    pub auto_resolvable: bool,
    pub subject: ConflictSubject,
    /// The differing values, keyed by the system that reported them
    pub source_values: BTreeMap<String, serde_json::Value>,
}

impl Conflict {
    pub fn new(
        conflict_type: ConflictType,
        subject: ConflictSubject,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category: conflict_type.category(),
            conflict_type,
            description: description.into(),
            severity: conflict_type.base_severity(),
            auto_resolvable: conflict_type.auto_resolvable(),
            subject,
            source_values: BTreeMap::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_value(mut self, source: &str, value: impl Into<serde_json::Value>) -> Self {
        self.source_values.insert(source.to_string(), value.into());
        self
    }
}

/// Detection output grouped by category, most severe first within each group
pub type ConflictMap = BTreeMap<ConflictCategory, Vec<Conflict>>;

pub fn group_conflicts(mut conflicts: Vec<Conflict>) -> ConflictMap {
    conflicts.sort_by(|a, b| b.severity.cmp(&a.severity));
    let mut map = ConflictMap::new();
    for conflict in conflicts {
        map.entry(conflict.category).or_default().push(conflict);
    }
    map
}

/// Resolution step applied to an auto-resolvable conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    ClearBinAssignment,
    AdoptBinState,
    LinkAgentToBin,
    AssignBinToAgent,
    FlagMissingUpstream,
    AdoptExternalBinName,
    /// Conflict needs a human decision
    QueueForManualReview,
}

impl ResolutionAction {
    pub fn for_conflict(conflict_type: ConflictType) -> Self {
        match conflict_type {
            ConflictType::OrphanBinAssignment => ResolutionAction::ClearBinAssignment,
            ConflictType::StateMismatch => ResolutionAction::AdoptBinState,
            ConflictType::AgentLinkMissing => ResolutionAction::LinkAgentToBin,
            ConflictType::BinLinkMissing => ResolutionAction::AssignBinToAgent,
            ConflictType::MissingUpstream => ResolutionAction::FlagMissingUpstream,
            ConflictType::BinNameDrift => ResolutionAction::AdoptExternalBinName,
            ConflictType::AgentBinMissing
            | ConflictType::InactiveAgentAssigned
            | ConflictType::StockMismatch
            | ConflictType::AssignmentMismatch => ResolutionAction::QueueForManualReview,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionAction::ClearBinAssignment => "clear_bin_assignment",
            ResolutionAction::AdoptBinState => "adopt_bin_state",
            ResolutionAction::LinkAgentToBin => "link_agent_to_bin",
            ResolutionAction::AssignBinToAgent => "assign_bin_to_agent",
            ResolutionAction::FlagMissingUpstream => "flag_missing_upstream",
            ResolutionAction::AdoptExternalBinName => "adopt_external_bin_name",
            ResolutionAction::QueueForManualReview => "queue_for_manual_review",
        }
    }
}

/// Outcome of one resolution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub conflict_type: ConflictType,
    pub action: ResolutionAction,
    pub subject: ConflictSubject,
    pub success: bool,
    /// The conflict was gone when re-validated; nothing was written
    pub already_resolved: bool,
    pub error: Option<String>,
}
