//! Backoff policy for external API calls

use rand::Rng;
use std::time::Duration;

use crate::config::ExternalConfig;

/// Exponential backoff with random jitter, capped at `max_delay`
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &ExternalConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            jitter_factor: cfg.jitter_factor.clamp(0.0, 1.0),
        }
    }

    /// `base * 2^attempt`, capped at `max_delay`, without jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let delay_ms = (base * 2_f64.powi(attempt.min(30) as i32)).min(max);
        Duration::from_millis(delay_ms as u64)
    }

    pub fn add_jitter(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as f64;
        let jitter_range = delay_ms * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// Wait before retry `attempt`; a server-provided `Retry-After` wins over
    /// the computed backoff but is still capped
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let delay = retry_after
            .map(|d| d.min(self.max_delay))
            .unwrap_or_else(|| self.backoff_delay(attempt));
        self.add_jitter(delay)
    }
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
