//! Metric Record - one metric value of one epoch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::training::EpochMetrics;

/// Metric Record represents a single metric data point.
///
/// Metrics are keyed by `run_id` + `key` and ordered by `step`, the
/// 1-based epoch number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record stamped with the current time.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// One record per entry of an epoch's metrics, sharing a timestamp.
    #[must_use]
    pub fn from_epoch(run_id: &str, step: u64, metrics: &EpochMetrics) -> Vec<Self> {
        let timestamp = Utc::now();
        metrics
            .iter()
            .map(|(key, &value)| Self {
                run_id: run_id.to_string(),
                key: key.clone(),
                step,
                value,
                timestamp,
            })
            .collect()
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step/epoch number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
