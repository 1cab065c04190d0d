// Metrics sidecar (spec §4.10): wraps any registered integration and
// records per-name counters without touching the integration's own
// state, following the same RwLock-guarded hot-path-read shape as
// `resilience::registry::BreakerRegistry`.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct IntegrationMetrics {
    pub total: u64,
    pub success: u64,
    pub error: u64,
    pub total_duration: Duration,
    pub last_execution: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub last_error_msg: Option<String>,
}

impl IntegrationMetrics {
    pub fn avg_duration(&self) -> Duration {
        if self.total == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.total as u32
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.error as f64 / self.total as f64
        }
    }
}

/// Per-name metrics store. One instance is shared by the registry and
/// handed a name + outcome after every integration call.
#[derive(Default)]
pub struct MetricsSidecar {
    entries: RwLock<HashMap<String, IntegrationMetrics>>,
}

impl MetricsSidecar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, name: &str, duration: Duration) {
        let mut entries = self.entries.write();
        let metrics = entries.entry(name.to_string()).or_default();
        metrics.total += 1;
        metrics.success += 1;
        metrics.total_duration += duration;
        metrics.last_execution = Some(Utc::now());
    }

    pub fn record_error(&self, name: &str, duration: Duration, message: impl Into<String>) {
        let mut entries = self.entries.write();
        let metrics = entries.entry(name.to_string()).or_default();
        metrics.total += 1;
        metrics.error += 1;
        metrics.total_duration += duration;
        let now = Utc::now();
        metrics.last_execution = Some(now);
        metrics.last_error = Some(now);
        metrics.last_error_msg = Some(message.into());
    }

    pub fn get(&self, name: &str) -> Option<IntegrationMetrics> {
        self.entries.read().get(name).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, IntegrationMetrics> {
        self.entries.read().clone()
    }
}
