//! Persistence for the ledger, bins, agents and sync records
//!
//! Services talk to the traits below. [`PgStore`] is the production
//! implementation; [`MemoryStore`] backs tests and local tooling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    ApprovalStatus, Bin, DeliveryAgent, InventoryMovement, LedgerCounts, NewBin,
    NewMovement, Pagination, Product, StockFilter, SyncRecord,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Result of appending a movement
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(InventoryMovement),
    /// A movement with the same idempotency key already exists
    Duplicate(Uuid),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_movement(
        &self,
        input: &NewMovement,
        idempotency_key: Option<&str>,
    ) -> AppResult<InsertOutcome>;

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<InventoryMovement>>;

    /// Move a pending movement to `to`; false when it was no longer pending
    async fn decide_movement(
        &self,
        id: Uuid,
        to: ApprovalStatus,
        approved_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;

    /// Approved movements matching `filter`, archived rows included
    async fn approved_movements(&self, filter: &StockFilter) -> AppResult<Vec<InventoryMovement>>;

    async fn list_movements(&self, page: &Pagination) -> AppResult<(Vec<InventoryMovement>, u64)>;

    async fn ledger_counts(&self) -> AppResult<LedgerCounts>;

    /// Rows the archival policy would flag for `cutoff`
    async fn count_archival_eligible(&self, cutoff: DateTime<Utc>) -> AppResult<i64>;

    /// Flag at most `limit` eligible rows in one transaction
    async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
        archived_at: DateTime<Utc>,
    ) -> AppResult<u64>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn list_products(&self) -> AppResult<Vec<Product>>;

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>>;
}

#[async_trait]
pub trait BinStore: Send + Sync {
    async fn get_bin(&self, id: Uuid) -> AppResult<Option<Bin>>;

    async fn find_bin_by_zoho_id(&self, zoho_bin_id: &str) -> AppResult<Option<Bin>>;

    async fn list_bins(&self) -> AppResult<Vec<Bin>>;

    /// Insert a bin; an existing row with the same external id is returned as is
    async fn create_bin(&self, bin: &NewBin, now: DateTime<Utc>) -> AppResult<Bin>;

    async fn update_bin(&self, bin: &Bin) -> AppResult<()>;
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent(&self, id: Uuid) -> AppResult<Option<DeliveryAgent>>;

    async fn list_agents(&self) -> AppResult<Vec<DeliveryAgent>>;

    /// Write the link fields (`user_id`, `state`, `bin_id`, `status`)
    async fn update_agent(&self, agent: &DeliveryAgent) -> AppResult<()>;

    /// Write an agent and its bin together; on error neither row changes
    async fn link_agent_bin(&self, agent: &DeliveryAgent, bin: &Bin) -> AppResult<()>;
}

#[async_trait]
pub trait SyncRecordStore: Send + Sync {
    async fn insert_sync_record(&self, record: &SyncRecord) -> AppResult<()>;

    async fn sync_records_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SyncRecord>>;
}

/// Everything the engine persists
pub trait Store: LedgerStore + ProductStore + BinStore + AgentStore + SyncRecordStore {}

impl<T> Store for T where T: LedgerStore + ProductStore + BinStore + AgentStore + SyncRecordStore {}

pub type SharedStore = Arc<dyn Store>;

pub(crate) fn parse_enum<T: std::str::FromStr>(column: &str, value: &str) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| {
        crate::error::AppError::Internal(format!("Corrupt {} value {:?}: {}", column, value, e))
    })
}
