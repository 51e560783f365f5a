//! Delivery agent models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery agent lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Linked,
    Active,
    Inactive,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Created => "created",
            AgentStatus::Linked => "linked",
            AgentStatus::Active => "active",
            AgentStatus::Inactive => "inactive",
        }
    }

    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Created, Linked)
                | (Linked, Active)
                | (Linked, Inactive)
                | (Active, Inactive)
                | (Inactive, Active)
        )
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(AgentStatus::Created),
            "linked" => Ok(AgentStatus::Linked),
            "active" => Ok(AgentStatus::Active),
            "inactive" => Ok(AgentStatus::Inactive),
            other => Err(format!("unrecognized agent status: {}", other)),
        }
    }
}

/// A delivery agent as recorded by the agent subsystem
///
/// `bin_id` and `state` are the agent subsystem's own view; the bin
/// subsystem keeps an independent `assigned_to_da` on each bin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryAgent {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub state: Option<String>,
    pub bin_id: Option<Uuid>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryAgent {
    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_lifecycle() {
        assert!(AgentStatus::Created.can_transition_to(AgentStatus::Linked));
        assert!(AgentStatus::Linked.can_transition_to(AgentStatus::Active));
        assert!(AgentStatus::Active.can_transition_to(AgentStatus::Inactive));
        assert!(AgentStatus::Inactive.can_transition_to(AgentStatus::Active));

        assert!(!AgentStatus::Created.can_transition_to(AgentStatus::Active));
        assert!(!AgentStatus::Active.can_transition_to(AgentStatus::Created));
    }
}
