//! Read-only view of the authoritative external inventory system

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::ExternalBinSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::AppResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalWarehouse {
    pub warehouse_id: String,
    #[serde(default)]
    pub warehouse_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalLocation {
    pub location_id: String,
    #[serde(default)]
    pub location_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalZone {
    pub zone_id: String,
    #[serde(default)]
    pub zone_name: String,
    #[serde(default)]
    pub location_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalBin {
    pub bin_id: String,
    #[serde(default)]
    pub bin_name: String,
    #[serde(default)]
    pub zone_id: String,
}

impl ExternalBin {
    pub fn snapshot(&self, zone: &ExternalZone, location_id: &str) -> ExternalBinSnapshot {
        ExternalBinSnapshot {
            zoho_bin_id: self.bin_id.clone(),
            zoho_zone_id: zone.zone_id.clone(),
            zoho_location_id: location_id.to_string(),
            bin_name: self.bin_name.clone(),
            zone_name: zone.zone_name.clone(),
        }
    }
}

/// Stock of one item held in an external bin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalBinItem {
    pub item_id: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "stock_on_hand")]
    pub quantity: i64,
}

/// Source of truth for warehouses, zones, bins and their item counts
///
/// Listings return every record across all pages. Implementations fail
/// with `Auth` on rejected credentials, `RateLimit` once retries are
/// exhausted and `NotFound` when the referenced resource is absent.
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>>;

    async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>>;

    async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>>;

    async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>>;

    async fn list_bin_items(&self, bin_id: &str) -> AppResult<Vec<ExternalBinItem>>;

    /// Bins of a zone read straight from the external system, never from a cache
    async fn fresh_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        self.list_bins_for_zone(zone_id).await
    }

    /// Cheapest authenticated round trip, used for latency checks
    async fn ping(&self) -> AppResult<()> {
        self.list_locations().await.map(|_| ())
    }

    /// Drop any cached listings
    async fn clear_cache(&self) {}
}

#[async_trait]
impl<S: InventorySource + ?Sized> InventorySource for Arc<S> {
    async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>> {
        (**self).list_warehouses().await
    }

    async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>> {
        (**self).list_locations().await
    }

    async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>> {
        (**self).list_zones_for_location(location_id).await
    }

    async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        (**self).list_bins_for_zone(zone_id).await
    }

    async fn list_bin_items(&self, bin_id: &str) -> AppResult<Vec<ExternalBinItem>> {
        (**self).list_bin_items(bin_id).await
    }

    async fn fresh_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        (**self).fresh_bins_for_zone(zone_id).await
    }

    async fn ping(&self) -> AppResult<()> {
        (**self).ping().await
    }

    async fn clear_cache(&self) {
        (**self).clear_cache().await
    }
}

type Cached<T> = RwLock<HashMap<String, (Instant, Vec<T>)>>;

/// TTL cache over zone and bin listings
///
/// Item counts, warehouses and locations are always read through.
pub struct CachedInventorySource<S> {
    inner: S,
    ttl: Duration,
    zones: Cached<ExternalZone>,
    bins: Cached<ExternalBin>,
}

impl<S: InventorySource> CachedInventorySource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            zones: RwLock::new(HashMap::new()),
            bins: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn lookup<T: Clone>(&self, cache: &Cached<T>, key: &str) -> Option<Vec<T>> {
        let guard = cache.read().await;
        guard
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, rows)| rows.clone())
    }
}

#[async_trait]
impl<S: InventorySource> InventorySource for CachedInventorySource<S> {
    async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>> {
        self.inner.list_warehouses().await
    }

    async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>> {
        self.inner.list_locations().await
    }

    async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>> {
        if let Some(hit) = self.lookup(&self.zones, location_id).await {
            debug!(location_id = %location_id, "zone listing served from cache");
            return Ok(hit);
        }
        let zones = self.inner.list_zones_for_location(location_id).await?;
        self.zones
            .write()
            .await
            .insert(location_id.to_string(), (Instant::now(), zones.clone()));
        Ok(zones)
    }

    async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        if let Some(hit) = self.lookup(&self.bins, zone_id).await {
            debug!(zone_id = %zone_id, "bin listing served from cache");
            return Ok(hit);
        }
        self.fresh_bins_for_zone(zone_id).await
    }

    async fn fresh_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        let bins = self.inner.fresh_bins_for_zone(zone_id).await?;
        self.bins
            .write()
            .await
            .insert(zone_id.to_string(), (Instant::now(), bins.clone()));
        Ok(bins)
    }

    async fn list_bin_items(&self, bin_id: &str) -> AppResult<Vec<ExternalBinItem>> {
        self.inner.list_bin_items(bin_id).await
    }

    async fn ping(&self) -> AppResult<()> {
        self.inner.ping().await
    }

    async fn clear_cache(&self) {
        self.zones.write().await.clear();
        self.bins.write().await.clear();
        self.inner.clear_cache().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSource {
        zone_calls: AtomicUsize,
        bin_calls: AtomicUsize,
        clears: AtomicUsize,
    }

    #[async_trait]
    impl InventorySource for CountingSource {
        async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>> {
            Ok(Vec::new())
        }

        async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>> {
            Ok(Vec::new())
        }

        async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>> {
            self.zone_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ExternalZone {
                zone_id: "ZN1".to_string(),
                zone_name: "Lagos Island".to_string(),
                location_id: location_id.to_string(),
            }])
        }

        async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
            let call = self.bin_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ExternalBin {
                bin_id: format!("B{}", call),
                bin_name: String::new(),
                zone_id: zone_id.to_string(),
            }])
        }

        async fn list_bin_items(&self, _bin_id: &str) -> AppResult<Vec<ExternalBinItem>> {
            Ok(Vec::new())
        }

        async fn clear_cache(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn cached(ttl: Duration) -> CachedInventorySource<CountingSource> {
        CachedInventorySource::new(CountingSource::default(), ttl)
    }

    #[tokio::test]
    async fn test_listings_served_from_cache_within_ttl() {
        let source = cached(Duration::from_secs(300));
        source.list_zones_for_location("LOC1").await.unwrap();
        source.list_zones_for_location("LOC1").await.unwrap();
        let first = source.list_bins_for_zone("ZN1").await.unwrap();
        let second = source.list_bins_for_zone("ZN1").await.unwrap();

        assert_eq!(source.inner().zone_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.inner().bin_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);

        // Keys are cached independently
        source.list_bins_for_zone("ZN2").await.unwrap();
        assert_eq!(source.inner().bin_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let source = cached(Duration::ZERO);
        source.list_zones_for_location("LOC1").await.unwrap();
        source.list_zones_for_location("LOC1").await.unwrap();
        assert_eq!(source.inner().zone_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch_and_reaches_inner() {
        let source = cached(Duration::from_secs(300));
        source.list_zones_for_location("LOC1").await.unwrap();
        source.list_bins_for_zone("ZN1").await.unwrap();

        source.clear_cache().await;
        source.list_zones_for_location("LOC1").await.unwrap();
        source.list_bins_for_zone("ZN1").await.unwrap();

        assert_eq!(source.inner().zone_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.inner().bin_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.inner().clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fresh_read_bypasses_and_refreshes_cache() {
        let source = cached(Duration::from_secs(300));
        let stale = source.list_bins_for_zone("ZN1").await.unwrap();
        let fresh = source.fresh_bins_for_zone("ZN1").await.unwrap();
        assert_ne!(stale, fresh);
        assert_eq!(source.list_bins_for_zone("ZN1").await.unwrap(), fresh);
        assert_eq!(source.inner().bin_calls.load(Ordering::SeqCst), 2);
    }
}
