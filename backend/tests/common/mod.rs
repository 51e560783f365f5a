//! Fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use shared::{AgentStatus, Bin, BinStatus, DeliveryAgent, Product};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use stock_ledger::config::{
    ArchivalConfig, Config, ConflictConfig, DatabaseConfig, ExternalConfig, HealthConfig,
    LedgerConfig, ServerConfig, SyncConfig, ThresholdConfig,
};
use stock_ledger::external::{
    ExternalBin, ExternalBinItem, ExternalLocation, ExternalWarehouse, ExternalZone,
    InventorySource,
};
use stock_ledger::services::{
    ConflictDetector, ConflictResolver, LeaseRegistry, ReviewQueue, SyncOrchestrator,
};
use stock_ledger::store::{MemoryStore, SharedStore};
use stock_ledger::{AppError, AppResult, AppState};

pub const LOCATION: &str = "LOC1";

/// How the fake answers every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    None,
    Auth,
    Unavailable,
}

#[derive(Default)]
struct Listings {
    zones: Vec<ExternalZone>,
    bins: HashMap<String, Vec<ExternalBin>>,
    items: HashMap<String, Vec<ExternalBinItem>>,
}

/// Scripted external inventory system
pub struct FakeSource {
    listings: Mutex<Listings>,
    failure: Mutex<Failure>,
    pub cache_clears: AtomicUsize,
    pub zone_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            listings: Mutex::new(Listings::default()),
            failure: Mutex::new(Failure::None),
            cache_clears: AtomicUsize::new(0),
            zone_calls: AtomicUsize::new(0),
        }
    }

    /// Add a zone holding one bin
    pub fn with_bin(self, zone_id: &str, zone_name: &str, bin_id: &str, bin_name: &str) -> Self {
        self.add_bin(zone_id, zone_name, bin_id, bin_name);
        self
    }

    pub fn add_bin(&self, zone_id: &str, zone_name: &str, bin_id: &str, bin_name: &str) {
        let mut listings = self.listings.lock().unwrap();
        if !listings.zones.iter().any(|z| z.zone_id == zone_id) {
            listings.zones.push(ExternalZone {
                zone_id: zone_id.to_string(),
                zone_name: zone_name.to_string(),
                location_id: LOCATION.to_string(),
            });
        }
        listings
            .bins
            .entry(zone_id.to_string())
            .or_default()
            .push(ExternalBin {
                bin_id: bin_id.to_string(),
                bin_name: bin_name.to_string(),
                zone_id: zone_id.to_string(),
            });
    }

    pub fn rename_bin(&self, bin_id: &str, bin_name: &str) {
        let mut listings = self.listings.lock().unwrap();
        for bin in listings.bins.values_mut().flatten() {
            if bin.bin_id == bin_id {
                bin.bin_name = bin_name.to_string();
            }
        }
    }

    pub fn remove_bin(&self, bin_id: &str) {
        let mut listings = self.listings.lock().unwrap();
        for bins in listings.bins.values_mut() {
            bins.retain(|b| b.bin_id != bin_id);
        }
    }

    pub fn set_items(&self, bin_id: &str, items: Vec<(&str, i64)>) {
        let mut listings = self.listings.lock().unwrap();
        listings.items.insert(
            bin_id.to_string(),
            items
                .into_iter()
                .map(|(sku, quantity)| ExternalBinItem {
                    item_id: format!("item-{}", sku),
                    sku: sku.to_string(),
                    name: sku.to_string(),
                    quantity,
                })
                .collect(),
        );
    }

    pub fn fail_with(&self, failure: Failure) {
        *self.failure.lock().unwrap() = failure;
    }

    fn check(&self) -> AppResult<()> {
        match *self.failure.lock().unwrap() {
            Failure::None => Ok(()),
            Failure::Auth => Err(AppError::Auth("token rejected".to_string())),
            Failure::Unavailable => Err(AppError::ExternalService("503 upstream".to_string())),
        }
    }
}

#[async_trait]
impl InventorySource for FakeSource {
    async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>> {
        self.check()?;
        Ok(vec![ExternalLocation {
            location_id: LOCATION.to_string(),
            location_name: "Delivery".to_string(),
        }])
    }

    async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>> {
        self.check()?;
        self.zone_calls.fetch_add(1, Ordering::SeqCst);
        let listings = self.listings.lock().unwrap();
        Ok(listings
            .zones
            .iter()
            .filter(|z| z.location_id == location_id)
            .cloned()
            .collect())
    }

    async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        self.check()?;
        let listings = self.listings.lock().unwrap();
        Ok(listings.bins.get(zone_id).cloned().unwrap_or_default())
    }

    async fn list_bin_items(&self, bin_id: &str) -> AppResult<Vec<ExternalBinItem>> {
        self.check()?;
        let listings = self.listings.lock().unwrap();
        Ok(listings.items.get(bin_id).cloned().unwrap_or_default())
    }

    async fn clear_cache(&self) {
        self.cache_clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn product(sku: &str, threshold: Option<i64>) -> Product {
    Product {
        id: Uuid::new_v4(),
        sku: sku.to_string(),
        name: format!("Product {}", sku),
        low_stock_threshold: threshold,
        unit_price: Decimal::new(2500, 0),
    }
}

pub fn agent(name: &str, bin_id: Option<Uuid>, state: Option<&str>) -> DeliveryAgent {
    let now = Utc::now();
    DeliveryAgent {
        id: Uuid::new_v4(),
        user_id: None,
        name: name.to_string(),
        state: state.map(str::to_string),
        bin_id,
        status: AgentStatus::Active,
        created_at: now,
        updated_at: now,
    }
}

pub fn bin(zoho_bin_id: &str, zone_id: &str, name: &str, state: Option<&str>) -> Bin {
    let now = Utc::now();
    Bin {
        id: Uuid::new_v4(),
        zoho_bin_id: zoho_bin_id.to_string(),
        zoho_zone_id: zone_id.to_string(),
        zoho_location_id: LOCATION.to_string(),
        name: name.to_string(),
        zone_name: format!("{} zone", state.unwrap_or("Unknown")),
        state: state.map(str::to_string),
        assigned_to_da: None,
        status: BinStatus::Active,
        last_synced_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn conflict_config() -> ConflictConfig {
    ConflictConfig {
        critical_value_threshold: Decimal::new(50_000, 0),
        high_quantity_threshold: 10,
    }
}

fn band(healthy: f64, warning: f64, unhealthy: f64) -> ThresholdConfig {
    ThresholdConfig {
        healthy,
        warning,
        unhealthy,
    }
}

/// Configuration matching the built-in defaults
pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        database: DatabaseConfig {
            url: "postgres://localhost/unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        external: ExternalConfig {
            base_url: "http://localhost:0".to_string(),
            organization_id: "ORG1".to_string(),
            access_token: "test-token".to_string(),
            delivery_location_id: LOCATION.to_string(),
            timeout_secs: 5,
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_factor: 0.0,
            page_size: 200,
            max_pages: 500,
            cache_ttl_secs: 60,
        },
        ledger: LedgerConfig {
            default_low_stock_threshold: 10,
        },
        sync: SyncConfig {
            lease_timeout_secs: 600,
        },
        conflicts: conflict_config(),
        health: HealthConfig {
            window_hours: 24,
            interval_secs: 60,
            alert_threshold: "warning".to_string(),
            success_rate: band(95.0, 80.0, 50.0),
            open_conflicts: band(0.0, 5.0, 20.0),
            queue_backlog: band(10.0, 50.0, 200.0),
            memory_mb: band(256.0, 512.0, 1024.0),
            latency_ms: band(1000.0, 3000.0, 10000.0),
        },
        archival: ArchivalConfig { batch_size: 500 },
    }
}

/// Store, source and the services wired the way the server wires them
pub struct Harness {
    pub memory: Arc<MemoryStore>,
    pub store: SharedStore,
    pub source: Arc<FakeSource>,
    pub leases: LeaseRegistry,
}

impl Harness {
    pub fn new(source: FakeSource) -> Self {
        let memory = Arc::new(MemoryStore::new());
        Self {
            store: memory.clone(),
            memory,
            source: Arc::new(source),
            leases: LeaseRegistry::new(std::time::Duration::from_secs(600)),
        }
    }

    /// Handler state over the same store and source
    pub fn app_state(&self) -> AppState {
        AppState::new(self.store.clone(), self.dyn_source(), test_config())
    }

    pub fn dyn_source(&self) -> Arc<dyn InventorySource> {
        self.source.clone()
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.store.clone(),
            self.dyn_source(),
            self.leases.clone(),
            LOCATION.to_string(),
        )
    }

    pub fn detector(&self) -> ConflictDetector {
        self.detector_over(self.dyn_source())
    }

    pub fn resolver(&self, review: ReviewQueue) -> ConflictResolver {
        self.resolver_over(self.dyn_source(), review)
    }

    /// Detector reading the external system through `source`
    pub fn detector_over(&self, source: Arc<dyn InventorySource>) -> ConflictDetector {
        ConflictDetector::new(
            self.store.clone(),
            source,
            LOCATION.to_string(),
            &conflict_config(),
        )
    }

    pub fn resolver_over(&self, source: Arc<dyn InventorySource>, review: ReviewQueue) -> ConflictResolver {
        ConflictResolver::new(
            self.store.clone(),
            source.clone(),
            self.detector_over(source),
            self.leases.clone(),
            review,
        )
    }
}
