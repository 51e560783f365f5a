//! Sync health checks and report aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health state, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    pub const ALL: [HealthStatus; 4] = [
        HealthStatus::Healthy,
        HealthStatus::Warning,
        HealthStatus::Unhealthy,
        HealthStatus::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Critical => "critical",
        }
    }

    /// Contribution of a single check to the overall score
    pub fn score(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 100.0,
            HealthStatus::Warning => 60.0,
            HealthStatus::Unhealthy => 30.0,
            HealthStatus::Critical => 0.0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "warning" => Ok(HealthStatus::Warning),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            "critical" => Ok(HealthStatus::Critical),
            other => Err(format!("unrecognized health status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Boundaries mapping a raw metric onto a [`HealthStatus`]
///
/// For `HigherIsBetter` a value `>= healthy` is healthy, `>= warning` is a
/// warning and so on. For `LowerIsBetter` the comparisons are `<=`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub direction: MetricDirection,
    pub healthy: f64,
    pub warning: f64,
    pub unhealthy: f64,
}

impl MetricThresholds {
    pub fn higher_is_better(healthy: f64, warning: f64, unhealthy: f64) -> Self {
        Self {
            direction: MetricDirection::HigherIsBetter,
            healthy,
            warning,
            unhealthy,
        }
    }

    pub fn lower_is_better(healthy: f64, warning: f64, unhealthy: f64) -> Self {
        Self {
            direction: MetricDirection::LowerIsBetter,
            healthy,
            warning,
            unhealthy,
        }
    }

    pub fn classify(&self, value: f64) -> HealthStatus {
        let within = |bound: f64| match self.direction {
            MetricDirection::HigherIsBetter => value >= bound,
            MetricDirection::LowerIsBetter => value <= bound,
        };
        if value.is_nan() {
            HealthStatus::Critical
        } else if within(self.healthy) {
            HealthStatus::Healthy
        } else if within(self.warning) {
            HealthStatus::Warning
        } else if within(self.unhealthy) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Critical
        }
    }
}

/// Fixed set of named checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    SyncSuccessRate,
    OpenConflicts,
    QueueBacklog,
    MemoryUsage,
    ExternalApiLatency,
}

impl CheckName {
    pub const ALL: [CheckName; 5] = [
        CheckName::SyncSuccessRate,
        CheckName::OpenConflicts,
        CheckName::QueueBacklog,
        CheckName::MemoryUsage,
        CheckName::ExternalApiLatency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::SyncSuccessRate => "sync_success_rate",
            CheckName::OpenConflicts => "open_conflicts",
            CheckName::QueueBacklog => "queue_backlog",
            CheckName::MemoryUsage => "memory_usage",
            CheckName::ExternalApiLatency => "external_api_latency",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub check_name: CheckName,
    pub status: HealthStatus,
    pub indicators: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl HealthCheckResult {
    pub fn new(check_name: CheckName, status: HealthStatus) -> Self {
        Self {
            check_name,
            status,
            indicators: BTreeMap::new(),
            error: None,
        }
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }

    /// A check whose metric could not be collected is critical
    pub fn failed(check_name: CheckName, error: impl Into<String>) -> Self {
        Self {
            check_name,
            status: HealthStatus::Critical,
            indicators: BTreeMap::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub overall_status: HealthStatus,
    /// Mean of the per-check scores, 0 to 100
    pub health_score: f64,
    pub checks: Vec<HealthCheckResult>,
}

impl HealthReport {
    pub fn from_checks(generated_at: DateTime<Utc>, checks: Vec<HealthCheckResult>) -> Self {
        Self {
            generated_at,
            overall_status: overall_status(&checks),
            health_score: health_score(&checks),
            checks,
        }
    }

    /// Recovery is due when the overall status is at or past the alert threshold
    pub fn needs_recovery(&self, alert_threshold: HealthStatus) -> bool {
        self.overall_status >= alert_threshold
    }

    pub fn check(&self, name: CheckName) -> Option<&HealthCheckResult> {
        self.checks.iter().find(|c| c.check_name == name)
    }
}

/// Worst status among the checks; healthy when there are none
pub fn overall_status(checks: &[HealthCheckResult]) -> HealthStatus {
    checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}

pub fn health_score(checks: &[HealthCheckResult]) -> f64 {
    if checks.is_empty() {
        return 100.0;
    }
    checks.iter().map(|c| c.status.score()).sum::<f64>() / checks.len() as f64
}

/// Outcome of one recovery action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    pub action: String,
    pub success: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub triggered: bool,
    pub actions: Vec<RecoveryAction>,
}

impl RecoveryResult {
    pub fn skipped() -> Self {
        Self {
            triggered: false,
            actions: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.actions.iter().all(|a| a.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_thresholds() {
        let t = MetricThresholds::higher_is_better(95.0, 80.0, 50.0);
        assert_eq!(t.classify(99.0), HealthStatus::Healthy);
        assert_eq!(t.classify(95.0), HealthStatus::Healthy);
        assert_eq!(t.classify(85.0), HealthStatus::Warning);
        assert_eq!(t.classify(50.0), HealthStatus::Unhealthy);
        assert_eq!(t.classify(10.0), HealthStatus::Critical);
    }

    #[test]
    fn test_lower_is_better_thresholds() {
        let t = MetricThresholds::lower_is_better(10.0, 50.0, 200.0);
        assert_eq!(t.classify(0.0), HealthStatus::Healthy);
        assert_eq!(t.classify(30.0), HealthStatus::Warning);
        assert_eq!(t.classify(150.0), HealthStatus::Unhealthy);
        assert_eq!(t.classify(500.0), HealthStatus::Critical);
    }

    #[test]
    fn test_report_aggregation() {
        let checks = vec![
            HealthCheckResult::new(CheckName::SyncSuccessRate, HealthStatus::Healthy),
            HealthCheckResult::new(CheckName::QueueBacklog, HealthStatus::Warning),
        ];
        let report = HealthReport::from_checks(Utc::now(), checks);
        assert_eq!(report.overall_status, HealthStatus::Warning);
        assert_eq!(report.health_score, 80.0);
        assert!(report.needs_recovery(HealthStatus::Warning));
        assert!(!report.needs_recovery(HealthStatus::Unhealthy));
    }

    #[test]
    fn test_parse_status() {
        assert_eq!("Critical".parse::<HealthStatus>(), Ok(HealthStatus::Critical));
        assert!("fine".parse::<HealthStatus>().is_err());
    }
}
