//! Metrics
//!
//! Refresh and replay metrics collection interfaces and implementations.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Metric labels.
pub type MetricLabels = HashMap<String, String>;

/// Refresh coordinator started an episode.
pub const REFRESH_STARTED: &str = "auth.refresh.started";
/// Refresh endpoint delivered a credential.
pub const REFRESH_SUCCEEDED: &str = "auth.refresh.succeeded";
/// Refresh episode ended without a credential.
pub const REFRESH_FAILED: &str = "auth.refresh.failed";
/// Duration of a refresh episode.
pub const REFRESH_DURATION_MS: &str = "auth.refresh.duration_ms";
/// Request joined an in-flight episode.
pub const WAITERS_ENQUEUED: &str = "auth.waiters.enqueued";
/// Waiters settled when an episode ended.
pub const WAITERS_RELEASED: &str = "auth.waiters.released";
/// Request replayed after a refresh.
pub const REPLAY: &str = "auth.replay";
/// Replayed request rejected again.
pub const RETRY_EXHAUSTED: &str = "auth.retry_exhausted";

/// Bearer authentication metrics interface.
pub trait AuthMetrics: Send + Sync {
    /// Record the start of a refresh episode.
    fn record_refresh_started(&self);

    /// Record the end of a refresh episode.
    fn record_refresh_completed(&self, success: bool, duration_ms: f64);

    /// Record a request joining the in-flight episode.
    fn record_waiter_enqueued(&self);

    /// Record `count` waiters being settled.
    fn record_waiters_released(&self, count: usize, success: bool);

    /// Record a replayed request and the status it received.
    fn record_replay(&self, status: u16);

    /// Record a replay that got no response.
    fn record_replay_failed(&self);

    /// Record a replay rejected with the expired status.
    fn record_retry_exhausted(&self);
}

/// No-op metrics implementation.
pub struct NoOpMetrics;

impl AuthMetrics for NoOpMetrics {
    fn record_refresh_started(&self) {}
    fn record_refresh_completed(&self, _success: bool, _duration_ms: f64) {}
    fn record_waiter_enqueued(&self) {}
    fn record_waiters_released(&self, _count: usize, _success: bool) {}
    fn record_replay(&self, _status: u16) {}
    fn record_replay_failed(&self) {}
    fn record_retry_exhausted(&self) {}
}

/// No-op metrics singleton.
pub fn no_op_metrics() -> NoOpMetrics {
    NoOpMetrics
}

/// Metric entry for in-memory storage.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub name: String,
    pub value: f64,
    pub labels: MetricLabels,
    pub timestamp: u64,
}

/// In-memory metrics for testing.
pub struct InMemoryMetrics {
    entries: Mutex<Vec<MetricEntry>>,
}

impl InMemoryMetrics {
    /// Create new in-memory metrics.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Get all recorded entries.
    pub fn get_entries(&self) -> Vec<MetricEntry> {
        self.lock().clone()
    }

    /// Get entries by name.
    pub fn get_entries_by_name(&self, name: &str) -> Vec<MetricEntry> {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    /// Sum of all values recorded under `name`.
    pub fn counter(&self, name: &str) -> u64 {
        self.lock()
            .iter()
            .filter(|e| e.name == name)
            .map(|e| e.value as u64)
            .sum()
    }

    /// Clear all entries.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MetricEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, name: &str, value: f64, labels: MetricLabels) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        self.lock().push(MetricEntry {
            name: name.to_string(),
            value,
            labels,
            timestamp: now,
        });
    }
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn outcome_labels(success: bool) -> MetricLabels {
    let mut labels = MetricLabels::new();
    labels.insert("success".to_string(), success.to_string());
    labels
}

impl AuthMetrics for InMemoryMetrics {
    fn record_refresh_started(&self) {
        self.record(REFRESH_STARTED, 1.0, MetricLabels::new());
    }

    fn record_refresh_completed(&self, success: bool, duration_ms: f64) {
        let name = if success {
            REFRESH_SUCCEEDED
        } else {
            REFRESH_FAILED
        };
        self.record(name, 1.0, MetricLabels::new());
        self.record(REFRESH_DURATION_MS, duration_ms, outcome_labels(success));
    }

    fn record_waiter_enqueued(&self) {
        self.record(WAITERS_ENQUEUED, 1.0, MetricLabels::new());
    }

    fn record_waiters_released(&self, count: usize, success: bool) {
        self.record(WAITERS_RELEASED, count as f64, outcome_labels(success));
    }

    fn record_replay(&self, status: u16) {
        let mut labels = MetricLabels::new();
        labels.insert("status".to_string(), status.to_string());
        self.record(REPLAY, 1.0, labels);
    }

    fn record_replay_failed(&self) {
        let mut labels = MetricLabels::new();
        labels.insert("status".to_string(), "error".to_string());
        self.record(REPLAY, 1.0, labels);
    }

    fn record_retry_exhausted(&self) {
        self.record(RETRY_EXHAUSTED, 1.0, MetricLabels::new());
    }
}

/// Create in-memory metrics for testing.
pub fn create_in_memory_metrics() -> InMemoryMetrics {
    InMemoryMetrics::new()
}
