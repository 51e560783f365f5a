//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    ApprovalStatus, Bin, DeliveryAgent, InventoryMovement, LedgerCounts, NewBin, NewMovement,
    Pagination, Product, StockFilter, SyncRecord,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{parse_enum, AgentStore, BinStore, InsertOutcome, LedgerStore, ProductStore, SyncRecordStore};
use crate::error::{AppError, AppResult};

/// Single predicate shared by the archival count and the archival update
const ARCHIVAL_ELIGIBLE: &str =
    "archived = FALSE AND approval_status = 'approved' AND approved_at IS NOT NULL AND approved_at < $1";

const MOVEMENT_COLUMNS: &str = "id, product_id, location_id, movement_type, quantity, \
     approval_status, approved_at, idempotency_key, reference, notes, archived, archived_at, created_at";

const BIN_COLUMNS: &str = "id, zoho_bin_id, zoho_zone_id, zoho_location_id, name, zone_name, \
     state, assigned_to_da, status, last_synced_at, created_at, updated_at";

const AGENT_COLUMNS: &str = "id, user_id, name, state, bin_id, status, created_at, updated_at";

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn update_bin_query(bin: &Bin) -> PgQuery<'_> {
    sqlx::query(
        r#"
        UPDATE bins
        SET zoho_zone_id = $2, zoho_location_id = $3, name = $4, zone_name = $5,
            state = $6, assigned_to_da = $7, status = $8, last_synced_at = $9,
            updated_at = $10
        WHERE id = $1
        "#,
    )
    .bind(bin.id)
    .bind(&bin.zoho_zone_id)
    .bind(&bin.zoho_location_id)
    .bind(&bin.name)
    .bind(&bin.zone_name)
    .bind(&bin.state)
    .bind(bin.assigned_to_da)
    .bind(bin.status.as_str())
    .bind(bin.last_synced_at)
    .bind(bin.updated_at)
}

fn update_agent_query(agent: &DeliveryAgent) -> PgQuery<'_> {
    sqlx::query(
        r#"
        UPDATE delivery_agents
        SET user_id = $2, state = $3, bin_id = $4, status = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(agent.id)
    .bind(agent.user_id)
    .bind(&agent.state)
    .bind(agent.bin_id)
    .bind(agent.status.as_str())
    .bind(agent.updated_at)
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    location_id: Uuid,
    movement_type: String,
    quantity: i64,
    approval_status: String,
    approved_at: Option<DateTime<Utc>>,
    idempotency_key: Option<String>,
    reference: Option<String>,
    notes: Option<String>,
    archived: bool,
    archived_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for InventoryMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            location_id: row.location_id,
            movement_type: parse_enum("movement type", &row.movement_type)?,
            quantity: row.quantity,
            approval_status: parse_enum("approval status", &row.approval_status)?,
            approved_at: row.approved_at,
            idempotency_key: row.idempotency_key,
            reference: row.reference,
            notes: row.notes,
            archived: row.archived,
            archived_at: row.archived_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    low_stock_threshold: Option<i64>,
    unit_price: Decimal,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            sku: row.sku,
            name: row.name,
            low_stock_threshold: row.low_stock_threshold,
            unit_price: row.unit_price,
        }
    }
}

#[derive(Debug, FromRow)]
struct BinRow {
    id: Uuid,
    zoho_bin_id: String,
    zoho_zone_id: String,
    zoho_location_id: String,
    name: String,
    zone_name: String,
    state: Option<String>,
    assigned_to_da: Option<Uuid>,
    status: String,
    last_synced_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BinRow> for Bin {
    type Error = AppError;

    fn try_from(row: BinRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            zoho_bin_id: row.zoho_bin_id,
            zoho_zone_id: row.zoho_zone_id,
            zoho_location_id: row.zoho_location_id,
            name: row.name,
            zone_name: row.zone_name,
            state: row.state,
            assigned_to_da: row.assigned_to_da,
            status: parse_enum("bin status", &row.status)?,
            last_synced_at: row.last_synced_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AgentRow {
    id: Uuid,
    user_id: Option<Uuid>,
    name: String,
    state: Option<String>,
    bin_id: Option<Uuid>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for DeliveryAgent {
    type Error = AppError;

    fn try_from(row: AgentRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            state: row.state,
            bin_id: row.bin_id,
            status: parse_enum("agent status", &row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct SyncRecordRow {
    id: Uuid,
    target: String,
    dry_run: bool,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    success: bool,
    error: Option<String>,
    created: i32,
    updated: i32,
    unchanged: i32,
    failed: i32,
}

impl From<SyncRecordRow> for SyncRecord {
    fn from(row: SyncRecordRow) -> Self {
        Self {
            id: row.id,
            target: row.target,
            dry_run: row.dry_run,
            started_at: row.started_at,
            finished_at: row.finished_at,
            success: row.success,
            error: row.error,
            created: row.created,
            updated: row.updated,
            unchanged: row.unchanged,
            failed: row.failed,
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> AppResult<Vec<T>>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn insert_movement(
        &self,
        input: &NewMovement,
        idempotency_key: Option<&str>,
    ) -> AppResult<InsertOutcome> {
        let inserted = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            INSERT INTO inventory_movements (
                product_id, location_id, movement_type, quantity, idempotency_key, reference, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (idempotency_key) DO NOTHING
            RETURNING {}
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(input.product_id)
        .bind(input.location_id)
        .bind(input.movement_type.as_str())
        .bind(input.quantity)
        .bind(idempotency_key)
        .bind(&input.reference)
        .bind(&input.notes)
        .fetch_optional(&self.db)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.try_into()?));
        }

        let existing = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM inventory_movements WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_one(&self.db)
        .await?;

        Ok(InsertOutcome::Duplicate(existing))
    }

    async fn get_movement(&self, id: Uuid) -> AppResult<Option<InventoryMovement>> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM inventory_movements WHERE id = $1",
            MOVEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(InventoryMovement::try_from).transpose()
    }

    async fn decide_movement(
        &self,
        id: Uuid,
        to: ApprovalStatus,
        approved_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_movements
            SET approval_status = $2, approved_at = $3
            WHERE id = $1 AND approval_status = 'pending'
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(approved_at)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn approved_movements(&self, filter: &StockFilter) -> AppResult<Vec<InventoryMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM inventory_movements
            WHERE approval_status = 'approved'
              AND approved_at IS NOT NULL
              AND ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR location_id = $2)
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(filter.product_id)
        .bind(filter.location_id)
        .fetch_all(&self.db)
        .await?;

        convert_all(rows)
    }

    async fn list_movements(&self, page: &Pagination) -> AppResult<(Vec<InventoryMovement>, u64)> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM inventory_movements ORDER BY created_at DESC, id LIMIT $1 OFFSET $2",
            MOVEMENT_COLUMNS
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM inventory_movements")
            .fetch_one(&self.db)
            .await?;

        Ok((convert_all(rows)?, total.max(0) as u64))
    }

    async fn ledger_counts(&self) -> AppResult<LedgerCounts> {
        let (total, archived) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE archived) FROM inventory_movements",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(LedgerCounts { total, archived })
    }

    async fn count_archival_eligible(&self, cutoff: DateTime<Utc>) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM inventory_movements WHERE {}",
            ARCHIVAL_ELIGIBLE
        ))
        .bind(cutoff)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    async fn archive_batch(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
        archived_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query(&format!(
            r#"
            UPDATE inventory_movements
            SET archived = TRUE, archived_at = $3
            WHERE id IN (
                SELECT id FROM inventory_movements
                WHERE {}
                ORDER BY approved_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            "#,
            ARCHIVAL_ELIGIBLE
        ))
        .bind(cutoff)
        .bind(limit)
        .bind(archived_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, low_stock_threshold, unit_price FROM products ORDER BY sku",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT id, sku, name, low_stock_threshold, unit_price FROM products WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Product::from))
    }
}

#[async_trait]
impl BinStore for PgStore {
    async fn get_bin(&self, id: Uuid) -> AppResult<Option<Bin>> {
        let row = sqlx::query_as::<_, BinRow>(&format!("SELECT {} FROM bins WHERE id = $1", BIN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.map(Bin::try_from).transpose()
    }

    async fn find_bin_by_zoho_id(&self, zoho_bin_id: &str) -> AppResult<Option<Bin>> {
        let row = sqlx::query_as::<_, BinRow>(&format!(
            "SELECT {} FROM bins WHERE zoho_bin_id = $1",
            BIN_COLUMNS
        ))
        .bind(zoho_bin_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Bin::try_from).transpose()
    }

    async fn list_bins(&self) -> AppResult<Vec<Bin>> {
        let rows = sqlx::query_as::<_, BinRow>(&format!(
            "SELECT {} FROM bins ORDER BY zoho_bin_id",
            BIN_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        convert_all(rows)
    }

    async fn create_bin(&self, bin: &NewBin, now: DateTime<Utc>) -> AppResult<Bin> {
        sqlx::query(
            r#"
            INSERT INTO bins (
                zoho_bin_id, zoho_zone_id, zoho_location_id, name, zone_name, state,
                status, last_synced_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $7, $7)
            ON CONFLICT (zoho_bin_id) DO NOTHING
            "#,
        )
        .bind(&bin.zoho_bin_id)
        .bind(&bin.zoho_zone_id)
        .bind(&bin.zoho_location_id)
        .bind(&bin.name)
        .bind(&bin.zone_name)
        .bind(&bin.state)
        .bind(now)
        .execute(&self.db)
        .await?;

        self.find_bin_by_zoho_id(&bin.zoho_bin_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Bin {} vanished after insert", bin.zoho_bin_id)))
    }

    async fn update_bin(&self, bin: &Bin) -> AppResult<()> {
        update_bin_query(bin).execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for PgStore {
    async fn get_agent(&self, id: Uuid) -> AppResult<Option<DeliveryAgent>> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {} FROM delivery_agents WHERE id = $1",
            AGENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(DeliveryAgent::try_from).transpose()
    }

    async fn list_agents(&self) -> AppResult<Vec<DeliveryAgent>> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {} FROM delivery_agents ORDER BY name, id",
            AGENT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        convert_all(rows)
    }

    async fn update_agent(&self, agent: &DeliveryAgent) -> AppResult<()> {
        update_agent_query(agent).execute(&self.db).await?;
        Ok(())
    }

    async fn link_agent_bin(&self, agent: &DeliveryAgent, bin: &Bin) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        let bins = update_bin_query(bin).execute(&mut *tx).await?;
        let agents = update_agent_query(agent).execute(&mut *tx).await?;
        if bins.rows_affected() == 0 {
            return Err(AppError::NotFound("Bin".to_string()));
        }
        if agents.rows_affected() == 0 {
            return Err(AppError::NotFound("Delivery agent".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SyncRecordStore for PgStore {
    async fn insert_sync_record(&self, record: &SyncRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_records (
                id, target, dry_run, started_at, finished_at, success, error,
                created, updated, unchanged, failed
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.target)
        .bind(record.dry_run)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.success)
        .bind(&record.error)
        .bind(record.created)
        .bind(record.updated)
        .bind(record.unchanged)
        .bind(record.failed)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn sync_records_since(&self, since: DateTime<Utc>) -> AppResult<Vec<SyncRecord>> {
        let rows = sqlx::query_as::<_, SyncRecordRow>(
            r#"
            SELECT id, target, dry_run, started_at, finished_at, success, error,
                   created, updated, unchanged, failed
            FROM sync_records
            WHERE started_at >= $1
            ORDER BY started_at
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(SyncRecord::from).collect())
    }
}
