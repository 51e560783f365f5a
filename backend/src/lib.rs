//! Stock ledger and cross-system reconciliation engine
//!
//! Stock is derived from an append-only movement ledger. An external
//! inventory system is treated as authoritative and reconciled against the
//! local bin and delivery agent records, with conflict detection, automatic
//! resolution and health monitoring on top.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

use external::{CachedInventorySource, InventoryApiClient, InventorySource};
use services::{
    ArchivalService, ConflictDetector, ConflictResolver, HealthMonitor, LeaseRegistry,
    LedgerService, ManualAgentLinker, ReviewQueue, SyncOrchestrator, SyncQueue,
};
use store::SharedStore;

/// Application state shared across handlers and the CLI
///
/// Services are cheap to build and are created per use from the pieces
/// held here. Leases and queues are shared so every service sees them.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub source: Arc<dyn InventorySource>,
    pub config: Arc<Config>,
    pub leases: LeaseRegistry,
    pub queue: SyncQueue,
    pub review: ReviewQueue,
}

impl AppState {
    pub fn new(store: SharedStore, source: Arc<dyn InventorySource>, config: Config) -> Self {
        Self {
            leases: LeaseRegistry::new(config.sync.lease_timeout()),
            store,
            source,
            config: Arc::new(config),
            queue: SyncQueue::new(),
            review: ReviewQueue::default(),
        }
    }

    pub fn ledger(&self) -> LedgerService {
        LedgerService::new(
            self.store.clone(),
            self.config.ledger.default_low_stock_threshold,
        )
    }

    pub fn archival(&self) -> ArchivalService {
        ArchivalService::new(self.store.clone(), self.config.archival.batch_size)
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            self.store.clone(),
            Arc::clone(&self.source),
            self.leases.clone(),
            self.config.external.delivery_location_id.clone(),
        )
    }

    pub fn detector(&self) -> ConflictDetector {
        ConflictDetector::new(
            self.store.clone(),
            Arc::clone(&self.source),
            self.config.external.delivery_location_id.clone(),
            &self.config.conflicts,
        )
    }

    pub fn resolver(&self) -> ConflictResolver {
        ConflictResolver::new(
            self.store.clone(),
            Arc::clone(&self.source),
            self.detector(),
            self.leases.clone(),
            self.review.clone(),
        )
    }

    pub fn health_monitor(&self) -> HealthMonitor {
        HealthMonitor::new(
            self.store.clone(),
            self.detector(),
            self.resolver(),
            self.orchestrator(),
            self.queue.clone(),
            &self.config.health,
        )
    }

    pub fn linker(&self) -> ManualAgentLinker {
        ManualAgentLinker::new(self.store.clone(), self.leases.clone())
    }
}

/// The HTTP client for the external inventory system behind a listing cache
pub fn external_source(config: &Config) -> AppResult<Arc<dyn InventorySource>> {
    let client = InventoryApiClient::new(&config.external)?;
    Ok(Arc::new(CachedInventorySource::new(
        client,
        config.external.cache_ttl(),
    )))
}
