//! Sync health monitoring and automatic recovery

use chrono::{Duration as ChronoDuration, Utc};
use shared::{
    success_rate, CheckName, HealthCheckResult, HealthReport, HealthStatus, RecoveryAction,
    RecoveryResult, SyncTarget,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{get_current_pid, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::conflict::ConflictDetector;
use super::queue::SyncQueue;
use super::resolver::ConflictResolver;
use super::sync::SyncOrchestrator;
use crate::config::{HealthConfig, HealthThresholds};
use crate::error::AppResult;
use crate::external::InventorySource;
use crate::store::SharedStore;

/// Raw readings behind one health report; a failed reading carries its error
#[derive(Debug, Clone)]
pub struct HealthMetrics {
    /// `Ok(None)` when no live pass ran inside the window
    pub sync_success_rate: Result<Option<f64>, String>,
    pub sync_passes: usize,
    pub open_conflicts: Result<usize, String>,
    pub queue_backlog: usize,
    pub memory_mb: Option<f64>,
    pub external_latency_ms: Result<f64, String>,
}

/// Map raw readings to per-check results
pub fn evaluate(metrics: &HealthMetrics, thresholds: &HealthThresholds) -> Vec<HealthCheckResult> {
    let success = match &metrics.sync_success_rate {
        Ok(Some(rate)) => HealthCheckResult::new(
            CheckName::SyncSuccessRate,
            thresholds.success_rate.classify(*rate),
        )
        .with_indicator("success_rate", *rate)
        .with_indicator("passes", metrics.sync_passes as f64),
        Ok(None) => {
            let mut result = HealthCheckResult::new(CheckName::SyncSuccessRate, HealthStatus::Warning)
                .with_indicator("passes", 0.0);
            result.error = Some("no sync passes in window".to_string());
            result
        }
        Err(e) => HealthCheckResult::failed(CheckName::SyncSuccessRate, e.clone()),
    };

    let conflicts = match &metrics.open_conflicts {
        Ok(count) => HealthCheckResult::new(
            CheckName::OpenConflicts,
            thresholds.open_conflicts.classify(*count as f64),
        )
        .with_indicator("open_conflicts", *count as f64),
        Err(e) => HealthCheckResult::failed(CheckName::OpenConflicts, e.clone()),
    };

    let backlog = metrics.queue_backlog as f64;
    let queue = HealthCheckResult::new(CheckName::QueueBacklog, thresholds.queue_backlog.classify(backlog))
        .with_indicator("queue_size", backlog);

    let memory = match metrics.memory_mb {
        Some(mb) => HealthCheckResult::new(CheckName::MemoryUsage, thresholds.memory_mb.classify(mb))
            .with_indicator("memory_mb", mb),
        None => {
            let mut result = HealthCheckResult::new(CheckName::MemoryUsage, HealthStatus::Warning);
            result.error = Some("process memory unavailable".to_string());
            result
        }
    };

    let latency = match &metrics.external_latency_ms {
        Ok(ms) => HealthCheckResult::new(CheckName::ExternalApiLatency, thresholds.latency_ms.classify(*ms))
            .with_indicator("response_time_ms", *ms),
        Err(e) => HealthCheckResult::failed(CheckName::ExternalApiLatency, e.clone()),
    };

    vec![success, conflicts, queue, memory, latency]
}

/// Resident memory of this process in megabytes
pub fn process_memory_mb() -> Option<f64> {
    let pid = get_current_pid().ok()?;
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
}

#[derive(Clone)]
pub struct HealthMonitor {
    store: SharedStore,
    source: Arc<dyn InventorySource>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    orchestrator: SyncOrchestrator,
    queue: SyncQueue,
    thresholds: HealthThresholds,
    window: ChronoDuration,
}

impl HealthMonitor {
    pub fn new(
        store: SharedStore,
        detector: ConflictDetector,
        resolver: ConflictResolver,
        orchestrator: SyncOrchestrator,
        queue: SyncQueue,
        cfg: &HealthConfig,
    ) -> Self {
        Self {
            store,
            source: Arc::clone(orchestrator.source()),
            detector,
            resolver,
            orchestrator,
            queue,
            thresholds: HealthThresholds::from(cfg),
            window: ChronoDuration::hours(cfg.window_hours),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub async fn collect_metrics(&self) -> HealthMetrics {
        let since = Utc::now() - self.window;
        let (sync_success_rate, sync_passes) = match self.store.sync_records_since(since).await {
            Ok(records) => {
                let live: Vec<_> = records.into_iter().filter(|r| !r.dry_run).collect();
                (Ok(success_rate(&live)), live.len())
            }
            Err(e) => (Err(e.to_string()), 0),
        };

        let open_conflicts = self
            .detector
            .detect_all_conflicts()
            .await
            .map(|report| report.total)
            .map_err(|e| e.to_string());

        let started = Instant::now();
        let external_latency_ms = self
            .source
            .ping()
            .await
            .map(|()| started.elapsed().as_secs_f64() * 1000.0)
            .map_err(|e| e.to_string());

        HealthMetrics {
            sync_success_rate,
            sync_passes,
            open_conflicts,
            queue_backlog: self.queue.backlog(),
            memory_mb: process_memory_mb(),
            external_latency_ms,
        }
    }

    /// Evaluate every check; reads only
    pub async fn monitor_sync_health(&self) -> HealthReport {
        let metrics = self.collect_metrics().await;
        let report = HealthReport::from_checks(Utc::now(), evaluate(&metrics, &self.thresholds));
        info!(
            overall_status = report.overall_status.as_str(),
            health_score = report.health_score,
            "sync health evaluated"
        );
        for check in report.checks.iter().filter(|c| c.status != HealthStatus::Healthy) {
            warn!(
                check = check.check_name.as_str(),
                status = check.status.as_str(),
                indicators = ?check.indicators,
                error = ?check.error,
                "health check degraded"
            );
        }
        report
    }

    /// Run recovery actions for the degraded checks of `report`
    ///
    /// Nothing runs unless the overall status is at or past `alert_threshold`.
    pub async fn trigger_auto_recovery(
        &self,
        report: &HealthReport,
        alert_threshold: HealthStatus,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        if !report.needs_recovery(alert_threshold) {
            return RecoveryResult::skipped();
        }

        let degraded = |name: CheckName| {
            report
                .check(name)
                .is_some_and(|c| c.status >= alert_threshold)
        };
        let mut actions = Vec::new();

        if degraded(CheckName::ExternalApiLatency) || degraded(CheckName::SyncSuccessRate) {
            self.source.clear_cache().await;
            actions.push(RecoveryAction {
                action: "clear_cache".to_string(),
                success: true,
                detail: None,
            });
        }

        if degraded(CheckName::QueueBacklog) || !self.queue.failed_jobs().is_empty() {
            let requeued = self.queue.requeue_failed();
            actions.push(RecoveryAction {
                action: "requeue_failed".to_string(),
                success: true,
                detail: Some(format!("{} jobs requeued", requeued)),
            });
        }

        if degraded(CheckName::SyncSuccessRate) {
            self.queue.enqueue(SyncTarget::Global);
        }

        if self.queue.backlog() > 0 {
            let ran = self.orchestrator.drain_queue(&self.queue, cancel).await;
            let failed = ran.iter().filter(|(_, r)| !matches!(r, Ok(rec) if rec.success)).count();
            actions.push(RecoveryAction {
                action: "drain_queue".to_string(),
                success: failed == 0,
                detail: Some(format!("{} passes, {} failed", ran.len(), failed)),
            });
        }

        if degraded(CheckName::OpenConflicts) {
            let action = match self.resolver.auto_resolve_conflicts().await {
                Ok(results) => {
                    let failed = results.iter().filter(|r| !r.success).count();
                    RecoveryAction {
                        action: "auto_resolve_conflicts".to_string(),
                        success: failed == 0,
                        detail: Some(format!("{} results, {} failed", results.len(), failed)),
                    }
                }
                Err(e) => RecoveryAction {
                    action: "auto_resolve_conflicts".to_string(),
                    success: false,
                    detail: Some(e.to_string()),
                },
            };
            actions.push(action);
        }

        for action in &actions {
            if action.success {
                info!(action = %action.action, detail = ?action.detail, "recovery action finished");
            } else {
                error!(action = %action.action, detail = ?action.detail, "recovery action failed");
            }
        }

        RecoveryResult {
            triggered: true,
            actions,
        }
    }

    /// Evaluate and recover on a fixed interval until `cancel` fires
    pub async fn run_continuous(
        &self,
        interval: Duration,
        alert_threshold: HealthStatus,
        cancel: CancellationToken,
    ) -> AppResult<u64> {
        info!(interval_secs = interval.as_secs(), alert_threshold = alert_threshold.as_str(), "health monitor started");
        let mut ticker = tokio::time::interval(interval);
        let mut iterations = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(iterations, "health monitor stopping");
                    break;
                }
                _ = ticker.tick() => {
                    iterations += 1;
                    let report = self.monitor_sync_health().await;
                    let recovery = self.trigger_auto_recovery(&report, alert_threshold, &cancel).await;
                    if recovery.triggered && !recovery.all_succeeded() {
                        warn!(overall_status = report.overall_status.as_str(), "recovery incomplete");
                    }
                }
            }
        }
        Ok(iterations)
    }
}
