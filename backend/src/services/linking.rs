//! Delivery agent linking
//!
//! Linking ties an agent to a user identity and a bin. It sits behind
//! [`AgentLinker`] so an approval-driven workflow can replace the manual
//! procedure without touching sync or conflict handling.

use async_trait::async_trait;
use chrono::Utc;
use shared::{AgentStatus, DeliveryAgent, SyncTarget};
use tracing::info;
use uuid::Uuid;

use super::lease::LeaseRegistry;
use crate::error::{AppError, AppResult};
use crate::store::SharedStore;

#[async_trait]
pub trait AgentLinker: Send + Sync {
    /// Link an agent to a user and a bin; the bin's state becomes the agent's
    async fn link(&self, agent_id: Uuid, user_id: Uuid, bin_id: Uuid) -> AppResult<DeliveryAgent>;

    async fn activate(&self, agent_id: Uuid) -> AppResult<DeliveryAgent>;

    async fn deactivate(&self, agent_id: Uuid) -> AppResult<DeliveryAgent>;
}

/// Operator-driven linking
#[derive(Clone)]
pub struct ManualAgentLinker {
    store: SharedStore,
    leases: LeaseRegistry,
}

impl ManualAgentLinker {
    pub fn new(store: SharedStore, leases: LeaseRegistry) -> Self {
        Self { store, leases }
    }

    async fn load(&self, agent_id: Uuid) -> AppResult<DeliveryAgent> {
        self.store
            .get_agent(agent_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Delivery agent".to_string()))
    }

    async fn transition(&self, agent_id: Uuid, next: AgentStatus) -> AppResult<DeliveryAgent> {
        let _lease = self.leases.acquire(&SyncTarget::Agent(agent_id))?;
        let mut agent = self.load(agent_id).await?;
        if agent.status == next {
            return Ok(agent);
        }
        if !agent.status.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition(format!(
                "Delivery agent {} cannot go from {} to {}",
                agent_id,
                agent.status.as_str(),
                next.as_str()
            )));
        }
        agent.status = next;
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;
        info!(agent_id = %agent_id, status = next.as_str(), "delivery agent status changed");
        Ok(agent)
    }
}

#[async_trait]
impl AgentLinker for ManualAgentLinker {
    async fn link(&self, agent_id: Uuid, user_id: Uuid, bin_id: Uuid) -> AppResult<DeliveryAgent> {
        let _agent_lease = self.leases.acquire(&SyncTarget::Agent(agent_id))?;
        let _bin_lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let mut agent = self.load(agent_id).await?;
        let mut bin = self
            .store
            .get_bin(bin_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bin".to_string()))?;

        if let Some(other) = bin.assigned_to_da.filter(|da| *da != agent_id) {
            return Err(AppError::validation(
                "bin_id",
                format!("Bin {} is already assigned to delivery agent {}", bin.name, other),
            ));
        }
        if let Some(current) = agent.bin_id.filter(|b| *b != bin_id) {
            return Err(AppError::validation(
                "da_id",
                format!("Delivery agent {} is already linked to bin {}", agent_id, current),
            ));
        }

        let now = Utc::now();
        agent.user_id = Some(user_id);
        agent.bin_id = Some(bin_id);
        if bin.state.is_some() {
            agent.state = bin.state.clone();
        }
        if agent.status == AgentStatus::Created {
            agent.status = AgentStatus::Linked;
        }
        agent.updated_at = now;

        bin.assigned_to_da = Some(agent_id);
        bin.updated_at = now;

        self.store.link_agent_bin(&agent, &bin).await?;

        info!(
            agent_id = %agent_id,
            user_id = %user_id,
            bin_id = %bin_id,
            state = ?agent.state,
            "delivery agent linked"
        );
        Ok(agent)
    }

    async fn activate(&self, agent_id: Uuid) -> AppResult<DeliveryAgent> {
        self.transition(agent_id, AgentStatus::Active).await
    }

    async fn deactivate(&self, agent_id: Uuid) -> AppResult<DeliveryAgent> {
        self.transition(agent_id, AgentStatus::Inactive).await
    }
}
