//! Automatic resolution of conflicts between the agent and bin subsystems
//!
//! Policy: the external system wins for bin names and presence, the bin
//! subsystem wins over the agent subsystem for state, and one-sided links
//! are completed from the side that has them. Anything ambiguous is queued
//! for manual review. Ledger movements are never touched.

use chrono::Utc;
use serde::Serialize;
use shared::{
    BinStatus, Conflict, ConflictSubject, ConflictType, ResolutionAction, ResolutionResult,
    SyncTarget,
};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use super::conflict::{ConflictDetector, ConflictReport};
use super::lease::LeaseRegistry;
use crate::error::{AppError, AppResult};
use crate::external::InventorySource;
use crate::store::SharedStore;

/// Conflicts waiting for an operator
#[derive(Clone, Default)]
pub struct ReviewQueue {
    items: Arc<Mutex<Vec<Conflict>>>,
}

impl ReviewQueue {
    /// Returns false when the same conflict is already queued
    pub fn push(&self, conflict: &Conflict) -> bool {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let queued = items
            .iter()
            .any(|c| c.conflict_type == conflict.conflict_type && c.subject == conflict.subject);
        if !queued {
            items.push(conflict.clone());
        }
        !queued
    }

    /// Drop queued conflicts that `detected` no longer reports; returns how many were dropped
    pub fn retain_detected(&self, detected: &[Conflict]) -> usize {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let before = items.len();
        items.retain(|queued| {
            detected
                .iter()
                .any(|c| c.conflict_type == queued.conflict_type && c.subject == queued.subject)
        });
        before - items.len()
    }

    pub fn pending(&self) -> Vec<Conflict> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Summary of one resolution run
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    pub results: Vec<ResolutionResult>,
    pub resolved: usize,
    pub already_resolved: usize,
    pub queued: usize,
    pub failed: usize,
}

impl ResolutionSummary {
    pub fn from_results(results: Vec<ResolutionResult>) -> Self {
        let manual = |r: &&ResolutionResult| r.action == ResolutionAction::QueueForManualReview;
        Self {
            resolved: results
                .iter()
                .filter(|r| r.success && !r.already_resolved && !manual(r))
                .count(),
            already_resolved: results.iter().filter(|r| r.already_resolved).count(),
            queued: results.iter().filter(manual).count(),
            failed: results.iter().filter(|r| !r.success).count(),
            results,
        }
    }
}

/// What re-validation found right before acting
enum Step {
    Applied,
    AlreadyResolved,
}

#[derive(Clone)]
pub struct ConflictResolver {
    store: SharedStore,
    source: Arc<dyn InventorySource>,
    detector: ConflictDetector,
    leases: LeaseRegistry,
    review: ReviewQueue,
}

fn required(id: Option<Uuid>, what: &str) -> AppResult<Uuid> {
    id.ok_or_else(|| AppError::ConflictResolution(format!("conflict carries no {} id", what)))
}

impl ConflictResolver {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn InventorySource>,
        detector: ConflictDetector,
        leases: LeaseRegistry,
        review: ReviewQueue,
    ) -> Self {
        Self {
            store,
            source,
            detector,
            leases,
            review,
        }
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.review
    }

    /// Detect conflicts afresh and resolve every auto-resolvable one
    pub async fn auto_resolve_conflicts(&self) -> AppResult<Vec<ResolutionResult>> {
        let report = self.detector.detect_all_conflicts().await?;
        Ok(self.resolve_report(&report).await)
    }

    /// Resolve the conflicts of a complete detection pass
    ///
    /// Queued manual conflicts the pass no longer reports are dropped first.
    pub async fn resolve_report(&self, report: &ConflictReport) -> Vec<ResolutionResult> {
        let conflicts: Vec<Conflict> = report.iter().cloned().collect();
        let dropped = self.review.retain_detected(&conflicts);
        if dropped > 0 {
            info!(dropped, "stale conflicts removed from manual review");
        }
        self.resolve(&conflicts).await
    }

    /// Resolve a previously detected set of conflicts
    ///
    /// Each conflict is re-validated against current records first; one that
    /// no longer holds is reported as already resolved.
    pub async fn resolve(&self, conflicts: &[Conflict]) -> Vec<ResolutionResult> {
        let mut results = Vec::with_capacity(conflicts.len());
        for conflict in conflicts {
            let action = ResolutionAction::for_conflict(conflict.conflict_type);
            let result = if !conflict.auto_resolvable
                || action == ResolutionAction::QueueForManualReview
            {
                let newly_queued = self.review.push(conflict);
                info!(
                    conflict_type = conflict.conflict_type.as_str(),
                    severity = conflict.severity.as_str(),
                    newly_queued,
                    "conflict queued for manual review"
                );
                outcome(conflict, ResolutionAction::QueueForManualReview, Ok(Step::Applied))
            } else {
                let step = self.apply(conflict.conflict_type, &conflict.subject).await;
                outcome(conflict, action, step)
            };

            if result.success {
                info!(
                    conflict_type = result.conflict_type.as_str(),
                    action = result.action.as_str(),
                    already_resolved = result.already_resolved,
                    bin_id = ?result.subject.bin_id,
                    agent_id = ?result.subject.agent_id,
                    "conflict resolution finished"
                );
            } else {
                warn!(
                    conflict_type = result.conflict_type.as_str(),
                    action = result.action.as_str(),
                    error = ?result.error,
                    bin_id = ?result.subject.bin_id,
                    agent_id = ?result.subject.agent_id,
                    "conflict resolution failed"
                );
            }
            results.push(result);
        }
        results
    }

    async fn apply(&self, conflict_type: ConflictType, subject: &ConflictSubject) -> AppResult<Step> {
        match conflict_type {
            ConflictType::OrphanBinAssignment => self.clear_orphan(subject).await,
            ConflictType::StateMismatch => self.adopt_bin_state(subject).await,
            ConflictType::AgentLinkMissing => self.link_agent(subject).await,
            ConflictType::BinLinkMissing => self.assign_bin(subject).await,
            ConflictType::MissingUpstream => self.flag_missing_upstream(subject).await,
            ConflictType::BinNameDrift => self.adopt_external_name(subject).await,
            other => Err(AppError::ConflictResolution(format!(
                "{} has no automatic resolution",
                other.as_str()
            ))),
        }
    }

    async fn clear_orphan(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let agent_id = required(subject.agent_id, "agent")?;
        let _lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let mut bin = self.load_bin(bin_id).await?;
        if bin.assigned_to_da != Some(agent_id) || self.store.get_agent(agent_id).await?.is_some() {
            return Ok(Step::AlreadyResolved);
        }
        bin.assigned_to_da = None;
        bin.updated_at = Utc::now();
        self.store.update_bin(&bin).await?;
        Ok(Step::Applied)
    }

    async fn adopt_bin_state(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let agent_id = required(subject.agent_id, "agent")?;
        let _agent_lease = self.leases.acquire(&SyncTarget::Agent(agent_id))?;
        let _bin_lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let bin = self.load_bin(bin_id).await?;
        let mut agent = self.load_agent(agent_id).await?;
        let Some(bin_state) = bin.state.clone() else {
            return Ok(Step::AlreadyResolved);
        };
        let agrees = agent
            .state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(&bin_state));
        if agent.bin_id != Some(bin_id) || agrees {
            return Ok(Step::AlreadyResolved);
        }
        agent.state = Some(bin_state);
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;
        Ok(Step::Applied)
    }

    async fn link_agent(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let agent_id = required(subject.agent_id, "agent")?;
        let _agent_lease = self.leases.acquire(&SyncTarget::Agent(agent_id))?;
        let _bin_lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let bin = self.load_bin(bin_id).await?;
        let mut agent = self.load_agent(agent_id).await?;
        match agent.bin_id {
            Some(current) if current == bin_id => return Ok(Step::AlreadyResolved),
            Some(current) => {
                return Err(AppError::ConflictResolution(format!(
                    "agent {} now claims bin {}",
                    agent_id, current
                )))
            }
            None => {}
        }
        if bin.assigned_to_da != Some(agent_id) {
            return Ok(Step::AlreadyResolved);
        }
        if self.claimed_by_other(bin_id, agent_id).await? {
            return Err(AppError::ConflictResolution(format!(
                "bin {} is claimed by another agent",
                bin_id
            )));
        }

        agent.bin_id = Some(bin_id);
        if bin.state.is_some() {
            agent.state = bin.state.clone();
        }
        agent.updated_at = Utc::now();
        self.store.update_agent(&agent).await?;
        Ok(Step::Applied)
    }

    async fn assign_bin(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let agent_id = required(subject.agent_id, "agent")?;
        let _agent_lease = self.leases.acquire(&SyncTarget::Agent(agent_id))?;
        let _bin_lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let mut bin = self.load_bin(bin_id).await?;
        let agent = self.load_agent(agent_id).await?;
        match bin.assigned_to_da {
            Some(current) if current == agent_id => return Ok(Step::AlreadyResolved),
            Some(current) => {
                return Err(AppError::ConflictResolution(format!(
                    "bin {} is now assigned to {}",
                    bin_id, current
                )))
            }
            None => {}
        }
        if agent.bin_id != Some(bin_id) {
            return Ok(Step::AlreadyResolved);
        }
        if self.claimed_by_other(bin_id, agent_id).await? {
            return Err(AppError::ConflictResolution(format!(
                "bin {} is claimed by more than one agent",
                bin_id
            )));
        }

        bin.assigned_to_da = Some(agent_id);
        bin.updated_at = Utc::now();
        self.store.update_bin(&bin).await?;
        Ok(Step::Applied)
    }

    async fn flag_missing_upstream(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let _lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let mut bin = self.load_bin(bin_id).await?;
        if bin.status == BinStatus::MissingUpstream {
            return Ok(Step::AlreadyResolved);
        }
        let upstream = match self.source.fresh_bins_for_zone(&bin.zoho_zone_id).await {
            Ok(bins) => bins,
            Err(AppError::NotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        if upstream.iter().any(|b| b.bin_id == bin.zoho_bin_id) {
            return Ok(Step::AlreadyResolved);
        }
        bin.status = BinStatus::MissingUpstream;
        bin.updated_at = Utc::now();
        self.store.update_bin(&bin).await?;
        Ok(Step::Applied)
    }

    async fn adopt_external_name(&self, subject: &ConflictSubject) -> AppResult<Step> {
        let bin_id = required(subject.bin_id, "bin")?;
        let _lease = self.leases.acquire(&SyncTarget::Bin(bin_id))?;

        let mut bin = self.load_bin(bin_id).await?;
        let upstream = self.source.fresh_bins_for_zone(&bin.zoho_zone_id).await?;
        let Some(external) = upstream.iter().find(|b| b.bin_id == bin.zoho_bin_id) else {
            return Err(AppError::ConflictResolution(format!(
                "bin {} is no longer reported upstream",
                bin.zoho_bin_id
            )));
        };
        if external.bin_name == bin.name {
            return Ok(Step::AlreadyResolved);
        }
        bin.name = external.bin_name.clone();
        bin.updated_at = Utc::now();
        self.store.update_bin(&bin).await?;
        Ok(Step::Applied)
    }

    async fn claimed_by_other(&self, bin_id: Uuid, agent_id: Uuid) -> AppResult<bool> {
        let agents = self.store.list_agents().await?;
        Ok(agents
            .iter()
            .any(|a| a.id != agent_id && a.bin_id == Some(bin_id)))
    }

    async fn load_bin(&self, id: Uuid) -> AppResult<shared::Bin> {
        self.store
            .get_bin(id)
            .await?
            .ok_or_else(|| AppError::ConflictResolution(format!("bin {} no longer exists", id)))
    }

    async fn load_agent(&self, id: Uuid) -> AppResult<shared::DeliveryAgent> {
        self.store
            .get_agent(id)
            .await?
            .ok_or_else(|| AppError::ConflictResolution(format!("delivery agent {} no longer exists", id)))
    }
}

fn outcome(conflict: &Conflict, action: ResolutionAction, step: AppResult<Step>) -> ResolutionResult {
    let (success, already_resolved, error) = match step {
        Ok(Step::Applied) => (true, false, None),
        Ok(Step::AlreadyResolved) => (true, true, None),
        Err(e) => (false, false, Some(e.to_string())),
    };
    ResolutionResult {
        conflict_type: conflict.conflict_type,
        action,
        subject: conflict.subject,
        success,
        already_resolved,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_queue_dedupes() {
        let queue = ReviewQueue::default();
        let conflict = Conflict::new(
            ConflictType::AssignmentMismatch,
            ConflictSubject {
                bin_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
            "contested",
        );
        assert!(queue.push(&conflict));
        assert!(!queue.push(&conflict));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_review_queue_drops_conflicts_no_longer_detected() {
        let queue = ReviewQueue::default();
        let subject = |bin_id| ConflictSubject {
            bin_id: Some(bin_id),
            ..Default::default()
        };
        let stale = Conflict::new(ConflictType::AssignmentMismatch, subject(Uuid::new_v4()), "settled");
        let live = Conflict::new(ConflictType::AssignmentMismatch, subject(Uuid::new_v4()), "contested");
        queue.push(&stale);
        queue.push(&live);

        assert_eq!(queue.retain_detected(std::slice::from_ref(&live)), 1);
        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, live.subject);

        assert_eq!(queue.retain_detected(&[]), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let conflict = Conflict::new(ConflictType::BinNameDrift, ConflictSubject::default(), "drift");
        let ok = outcome(&conflict, ResolutionAction::AdoptExternalBinName, Ok(Step::Applied));
        let again = outcome(&conflict, ResolutionAction::AdoptExternalBinName, Ok(Step::AlreadyResolved));
        let failed = outcome(
            &conflict,
            ResolutionAction::AdoptExternalBinName,
            Err(AppError::LockContention("bin:x".to_string())),
        );
        let summary = ResolutionSummary::from_results(vec![ok, again, failed]);
        assert_eq!(summary.resolved, 1);
        assert_eq!(summary.already_resolved, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.results[2].error.is_some());
    }
}
