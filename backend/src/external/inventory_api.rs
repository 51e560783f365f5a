//! HTTP client for the external inventory API
//!
//! Every request is organization-scoped and bearer-authenticated. List
//! endpoints answer with a `{<resource>: [...], page_context: {...}}`
//! envelope; pages are followed while `has_more_page` is set.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{parse_retry_after, RetryPolicy};
use super::source::{
    ExternalBin, ExternalBinItem, ExternalLocation, ExternalWarehouse, ExternalZone,
    InventorySource,
};
use crate::config::ExternalConfig;
use crate::error::{AppError, AppResult};

/// External inventory API client
#[derive(Clone)]
pub struct InventoryApiClient {
    client: Client,
    base_url: String,
    organization_id: String,
    access_token: String,
    page_size: u32,
    max_pages: u32,
    timeout: Duration,
    retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
struct PageContext {
    #[serde(default)]
    has_more_page: bool,
}

impl InventoryApiClient {
    pub fn new(cfg: &ExternalConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            organization_id: cfg.organization_id.clone(),
            access_token: cfg.access_token.clone(),
            page_size: cfg.page_size.max(1),
            max_pages: cfg.max_pages.max(1),
            timeout: cfg.timeout(),
            retry: RetryPolicy::from_config(cfg),
        })
    }

    /// GET one JSON document, retrying throttled and transient failures
    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> AppResult<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut attempt = 0u32;

        loop {
            let request = self
                .client
                .get(&url)
                .bearer_auth(&self.access_token)
                .query(&[("organization_id", self.organization_id.as_str())])
                .query(query);

            let response = match tokio::time::timeout(self.timeout, request.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt, None);
                    warn!(url = %url, error = %e, attempt, ?delay, "request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Ok(Err(e)) => {
                    return Err(AppError::ExternalService(format!("Request to {} failed: {}", path, e)))
                }
                Err(_) if attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt, None);
                    warn!(url = %url, attempt, ?delay, "request timed out, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(_) => {
                    return Err(AppError::ExternalService(format!(
                        "Request to {} timed out after {:?}",
                        path, self.timeout
                    )))
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= self.retry.max_retries {
                    return Err(AppError::RateLimit {
                        attempts: attempt + 1,
                    });
                }
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);
                let delay = self.retry.delay_for(attempt, retry_after);
                warn!(url = %url, attempt, ?delay, "rate limited by external API");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if status.is_server_error() && attempt < self.retry.max_retries {
                let delay = self.retry.delay_for(attempt, None);
                warn!(url = %url, %status, attempt, ?delay, "transient error from external API");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::Auth(format!("{} - {}", status, body)));
                }
                StatusCode::NOT_FOUND => {
                    return Err(AppError::NotFound(format!("External resource {}", path)));
                }
                s if !s.is_success() => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(AppError::ExternalService(format!(
                        "External API error: {} - {}",
                        status, body
                    )));
                }
                _ => {}
            }

            let body: serde_json::Value = response.json().await.map_err(|e| {
                AppError::ExternalService(format!("Failed to parse response from {}: {}", path, e))
            })?;

            // The API reports some failures as 200 with a non-zero code
            if let Some(code) = body.get("code").and_then(|c| c.as_i64()) {
                if code != 0 {
                    let message = body
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error");
                    return Err(AppError::ExternalService(format!(
                        "External API error {}: {}",
                        code, message
                    )));
                }
            }

            return Ok(body);
        }
    }

    /// Fetch every page of a listing, up to `max_pages`
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
        filters: &[(&str, String)],
    ) -> AppResult<Vec<T>> {
        let mut rows = Vec::new();
        let mut page = 1u32;

        loop {
            let mut query: Vec<(&str, String)> = filters.to_vec();
            query.push(("page", page.to_string()));
            query.push(("per_page", self.page_size.to_string()));

            let body = self.get_json(path, &query).await?;
            rows.extend(extract_records::<T>(&body, resource));

            let more = body
                .get("page_context")
                .cloned()
                .and_then(|ctx| serde_json::from_value::<PageContext>(ctx).ok())
                .unwrap_or_default()
                .has_more_page;
            if !more {
                break;
            }
            if page >= self.max_pages {
                warn!(path = %path, pages = page, "listing still reports more pages");
                return Err(AppError::ExternalService(format!(
                    "{} listing exceeded {} pages",
                    path, self.max_pages
                )));
            }
            page += 1;
        }

        debug!(path = %path, count = rows.len(), pages = page, "listing fetched");
        Ok(rows)
    }
}

/// Records under `resource`; a missing or non-array field is an empty list
/// and malformed records are skipped
pub(crate) fn extract_records<T: DeserializeOwned>(body: &serde_json::Value, resource: &str) -> Vec<T> {
    let Some(items) = body.get(resource).and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(resource = %resource, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl InventorySource for InventoryApiClient {
    async fn list_warehouses(&self) -> AppResult<Vec<ExternalWarehouse>> {
        self.list_all("settings/warehouses", "warehouses", &[]).await
    }

    async fn list_locations(&self) -> AppResult<Vec<ExternalLocation>> {
        self.list_all("locations", "locations", &[]).await
    }

    async fn list_zones_for_location(&self, location_id: &str) -> AppResult<Vec<ExternalZone>> {
        let mut zones: Vec<ExternalZone> = self
            .list_all("zones", "zones", &[("location_id", location_id.to_string())])
            .await?;
        for zone in zones.iter_mut().filter(|z| z.location_id.is_empty()) {
            zone.location_id = location_id.to_string();
        }
        Ok(zones)
    }

    async fn list_bins_for_zone(&self, zone_id: &str) -> AppResult<Vec<ExternalBin>> {
        let mut bins: Vec<ExternalBin> = self
            .list_all("bins", "bins", &[("zone_id", zone_id.to_string())])
            .await?;
        for bin in bins.iter_mut().filter(|b| b.zone_id.is_empty()) {
            bin.zone_id = zone_id.to_string();
        }
        Ok(bins)
    }

    async fn list_bin_items(&self, bin_id: &str) -> AppResult<Vec<ExternalBinItem>> {
        self.list_all(&format!("bins/{}/items", bin_id), "items", &[])
            .await
    }

    async fn ping(&self) -> AppResult<()> {
        self.get_json("locations", &[("per_page", "1".to_string())])
            .await
            .map(|_| ())
    }
}
