//! In-memory store with the same semantics as [`super::PgStore`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    ApprovalStatus, Bin, BinStatus, DeliveryAgent, InventoryMovement, LedgerCounts, NewBin,
    NewMovement, Pagination, Product, StockFilter, SyncRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AgentStore, BinStore, InsertOutcome, LedgerStore, ProductStore, SyncRecordStore};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    movements: Vec<InventoryMovement>,
    products: HashMap<Uuid, Product>,
    bins: HashMap<Uuid, Bin>,
    agents: HashMap<Uuid, DeliveryAgent>,
    sync_records: Vec<SyncRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_agent_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed catalogue data owned by the product collaborator
    pub async fn put_product(&self, product: Product) {
        self.tables.write().await.products.insert(product.id, product);
    }

    /// Seed agent data owned by the agent collaborator
    pub async fn put_agent(&self, agent: DeliveryAgent) {
        self.tables.write().await.agents.insert(agent.id, agent);
    }

    pub async fn put_bin(&self, bin: Bin) {
        self.tables.write().await.bins.insert(bin.id, bin);
    }

    /// Insert a movement as is, bypassing the ledger service
    pub async fn put_movement(&self, movement: InventoryMovement) {
        self.tables.write().await.movements.push(movement);
    }

    pub async fn all_movements(&self) -> Vec<InventoryMovement> {
        self.tables.read().await.movements.clone()
    }

    /// Make every agent write fail, as a lost database connection would
    pub fn fail_agent_writes(&self, fail: bool) {
        self.fail_agent_writes.store(fail, Ordering::SeqCst);
    }

    fn check_agent_writes(&self) -> AppResult<()> {
        if self.fail_agent_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("delivery_agents is unavailable".to_string()));
        }
        Ok(())
    }
}

impl Tables {
    fn write_bin(&mut self, bin: &Bin) {
        if let Some(existing) = self.bins.get_mut(&bin.id) {
            let created_at = existing.created_at;
            let zoho_bin_id = existing.zoho_bin_id.clone();
            *existing = bin.clone();
            existing.created_at = created_at;
            existing.zoho_bin_id = zoho_bin_id;
        }
    }

    fn write_agent(&mut self, agent: &DeliveryAgent) {
        if let Some(existing) = self.agents.get_mut(&agent.id) {
            existing.user_id = agent.user_id;
            existing.state = agent.state.clone();
            existing.bin_id = agent.bin_id;
            existing.status = agent.status;
            existing.updated_at = agent.updated_at;
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_movement(
        &self,
        input: &NewMovement,
        idempotency_key: Option<&str>,
    ) -> AppResult<InsertOutcome> {
        let mut tables = self.tables.write().await;

        if let Some(key) = idempotency_key {
            if let Some(existing) = tables
                .movements
                .iter()
                .find(|m| m.idempotency_key.as_deref() == Some(key))
            {
                return Ok(InsertOutcome::Duplicate(existing.id));
            }
        }
        if !tables.products.contains_key(&input.product_id) {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let movement = InventoryMovement {
            id: Uuid::new_v4(),
            product_id: input.product_id,
            location_id: input.location_id,
            movement_type: input.movement_type,
            quantity: input.quantity,
            approval_status: ApprovalStatus::Pending,
            approved_at: None,
            idempotency_key: idempotency_key.map(str::to_string),
            reference: input.reference.clone(),
            notes: input.notes.clone(),
            archived: false,
            archived_at: None,
            created_at: Utc::now(),
        };
        tables.movements.push(movement.clone());
        Ok(InsertOutcome::Inserted(movement))
    }

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<InventoryMovement>> {
        let tables = self.tables.read().await;
        Ok(tables.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn decide_movement(
        &self,
        id: Uuid,
        to: ApprovalStatus,
        approved_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .movements
            .iter_mut()
            .find(|m| m.id == id && m.approval_status == ApprovalStatus::Pending)
        {
            Some(movement) => {
                movement.approval_status = to;
                movement.approved_at = approved_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn approved_movements(&self, filter: &StockFilter) -> AppResult<Vec<InventoryMovement>> {
        let tables = self.tables.read().await;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.counts_toward_stock() && filter.matches(m))
            .cloned()
            .collect())
    }

    async fn list_movements(&self, page: &Pagination) -> AppResult<(Vec<InventoryMovement>, u64)> {
        let tables = self.tables.read().await;
        let mut rows = tables.movements.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();
        Ok((rows, total))
    }

    async fn ledger_counts(&self) -> AppResult<LedgerCounts> {
        let tables = self.tables.read().await;
        Ok(LedgerCounts {
            total: tables.movements.len() as i64,
            archived: tables.movements.iter().filter(|m| m.archived).count() as i64,
        })
    }

    async fn count_archival_eligible(&self, cutoff: DateTime<Utc>) -> AppResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables
            .movements
            .iter()
            .filter(|m| m.is_archival_eligible(cutoff))
            .count() as i64)
    }

    async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
        archived_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tables = self.tables.write().await;
        let mut flagged = 0u64;
        for movement in tables
            .movements
            .iter_mut()
            .filter(|m| m.is_archival_eligible(cutoff))
            .take(limit.max(0) as usize)
        {
            movement.archived = true;
            movement.archived_at = Some(archived_at);
            flagged += 1;
        }
        Ok(flagged)
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables.products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }
}

#[async_trait]
impl BinStore for MemoryStore {
    async fn get_bin(&self, id: Uuid) -> AppResult<Option<Bin>> {
        Ok(self.tables.read().await.bins.get(&id).cloned())
    }

    async fn find_bin_by_zoho_id(&self, zoho_bin_id: &str) -> AppResult<Option<Bin>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bins
            .values()
            .find(|b| b.zoho_bin_id == zoho_bin_id)
            .cloned())
    }

    async fn list_bins(&self) -> AppResult<Vec<Bin>> {
        let tables = self.tables.read().await;
        let mut bins: Vec<Bin> = tables.bins.values().cloned().collect();
        bins.sort_by(|a, b| a.zoho_bin_id.cmp(&b.zoho_bin_id));
        Ok(bins)
    }

    async fn create_bin(&self, bin: &NewBin, now: DateTime<Utc>) -> AppResult<Bin> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .bins
            .values()
            .find(|b| b.zoho_bin_id == bin.zoho_bin_id)
        {
            return Ok(existing.clone());
        }

        let created = Bin {
            id: Uuid::new_v4(),
            zoho_bin_id: bin.zoho_bin_id.clone(),
            zoho_zone_id: bin.zoho_zone_id.clone(),
            zoho_location_id: bin.zoho_location_id.clone(),
            name: bin.name.clone(),
            zone_name: bin.zone_name.clone(),
            state: bin.state.clone(),
            assigned_to_da: None,
            status: BinStatus::Active,
            last_synced_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        tables.bins.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_bin(&self, bin: &Bin) -> AppResult<()> {
        self.tables.write().await.write_bin(bin);
        Ok(())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn get_agent(&self, id: Uuid) -> AppResult<Option<DeliveryAgent>> {
        Ok(self.tables.read().await.agents.get(&id).cloned())
    }

    async fn list_agents(&self) -> AppResult<Vec<DeliveryAgent>> {
        let tables = self.tables.read().await;
        let mut agents: Vec<DeliveryAgent> = tables.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(agents)
    }

    async fn update_agent(&self, agent: &DeliveryAgent) -> AppResult<()> {
        self.check_agent_writes()?;
        self.tables.write().await.write_agent(agent);
        Ok(())
    }

    async fn link_agent_bin(&self, agent: &DeliveryAgent, bin: &Bin) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.bins.contains_key(&bin.id) {
            return Err(AppError::NotFound("Bin".to_string()));
        }
        if !tables.agents.contains_key(&agent.id) {
            return Err(AppError::NotFound("Delivery agent".to_string()));
        }
        self.check_agent_writes()?;
        tables.write_bin(bin);
        tables.write_agent(agent);
        Ok(())
    }
}

#[async_trait]
impl SyncRecordStore for MemoryStore {
    async fn insert_sync_record(&self, record: &SyncRecord) -> AppResult<()> {
        self.tables.write().await.sync_records.push(record.clone());
        Ok(())
    }

    async fn sync_records_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SyncRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .sync_records
            .iter()
            .filter(|r| r.started_at >= since)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use shared::MovementType;

    fn product() -> Product {
        Product {
            id: Uuid::new_v4(),
            sku: "SKU-1".to_string(),
            name: "Widget".to_string(),
            low_stock_threshold: None,
            unit_price: Decimal::ONE,
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_returns_existing_id() {
        let store = MemoryStore::new();
        let p = product();
        store.put_product(p.clone()).await;
        let input = NewMovement {
            product_id: p.id,
            location_id: Uuid::new_v4(),
            movement_type: MovementType::Receiving,
            quantity: 5,
            reference: Some("evt-1".to_string()),
            notes: None,
        };

        let first = store.insert_movement(&input, Some("k1")).await.unwrap();
        let InsertOutcome::Inserted(movement) = first else {
            panic!("expected insert");
        };
        let second = store.insert_movement(&input, Some("k1")).await.unwrap();
        assert_eq!(second, InsertOutcome::Duplicate(movement.id));
        assert_eq!(store.ledger_counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_decide_only_from_pending() {
        let store = MemoryStore::new();
        let p = product();
        store.put_product(p.clone()).await;
        let input = NewMovement {
            product_id: p.id,
            location_id: Uuid::new_v4(),
            movement_type: MovementType::Shipping,
            quantity: 1,
            reference: None,
            notes: None,
        };
        let InsertOutcome::Inserted(m) = store.insert_movement(&input, None).await.unwrap() else {
            panic!("expected insert");
        };
        let now = Utc::now();
        assert!(store.decide_movement(m.id, ApprovalStatus::Approved, Some(now)).await.unwrap());
        assert!(!store.decide_movement(m.id, ApprovalStatus::Rejected, None).await.unwrap());

        let cutoff = now + Duration::days(1);
        assert_eq!(store.count_archival_eligible(cutoff).await.unwrap(), 1);
    }
}
