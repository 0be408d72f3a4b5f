//! Experiment Store - in-memory tracking data for runs in this process

use std::collections::HashMap;

use super::{ArtifactRecord, MetricRecord, RunRecord, RunStatus};

/// In-memory store for experiment tracking data.
///
/// Runs are keyed by run id; metrics and artifacts are append-only vectors
/// filtered on query.
#[derive(Debug, Default)]
pub struct ExperimentStore {
    runs: HashMap<String, RunRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl ExperimentStore {
    /// Create a new empty experiment store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store is empty (no runs, metrics, or artifacts).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.metrics.is_empty() && self.artifacts.is_empty()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of metrics in the store.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Add a run to the store, replacing any run with the same id.
    pub fn add_run(&mut self, run: RunRecord) {
        self.runs.insert(run.run_id().to_string(), run);
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Get a run by ID for in-place updates.
    pub fn get_run_mut(&mut self, run_id: &str) -> Option<&mut RunRecord> {
        self.runs.get_mut(run_id)
    }

    /// Complete a run. Returns `false` if the run is unknown.
    pub fn complete_run(&mut self, run_id: &str, status: RunStatus) -> bool {
        self.runs.get_mut(run_id).map_or(false, |run| {
            run.complete(status);
            true
        })
    }

    /// Get all runs for an experiment.
    #[must_use]
    pub fn get_runs_for_experiment(&self, experiment: &str) -> Vec<&RunRecord> {
        self.runs
            .values()
            .filter(|run| run.experiment() == experiment)
            .collect()
    }

    /// Add a metric to the store.
    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Add an artifact to the store.
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) {
        self.artifacts.push(artifact);
    }

    /// Get metrics for a specific run and key, ordered by step.
    #[must_use]
    pub fn get_metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();

        metrics.sort_by_key(MetricRecord::step);

        metrics
    }

    /// Get artifacts logged by a run, in logging order.
    #[must_use]
    pub fn get_artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts
            .iter()
            .filter(|a| a.run_id() == run_id)
            .collect()
    }
}
