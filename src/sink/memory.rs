//! In-process tracking backend

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::Tracker;
use crate::experiment::{ArtifactRecord, ExperimentStore, MetricRecord, RunRecord, RunStatus};
use crate::training::EpochMetrics;
use crate::{Error, Result};

/// Records runs into a shared [`ExperimentStore`].
///
/// Useful when the driver is embedded in a larger process that wants to
/// inspect tracked data after the trial ends.
#[derive(Debug, Clone, Default)]
pub struct MemoryTracker {
    store: Arc<Mutex<ExperimentStore>>,
    run_id: Option<String>,
}

impl MemoryTracker {
    /// Tracker over a fresh store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker over an existing shared store.
    #[must_use]
    pub const fn with_store(store: Arc<Mutex<ExperimentStore>>) -> Self {
        Self {
            store,
            run_id: None,
        }
    }

    /// Shared handle on the backing store.
    #[must_use]
    pub fn store(&self) -> Arc<Mutex<ExperimentStore>> {
        Arc::clone(&self.store)
    }

    fn lock(&self) -> Result<(MutexGuard<'_, ExperimentStore>, &str)> {
        let run_id = self
            .run_id
            .as_deref()
            .ok_or_else(|| Error::sink("no run started"))?;
        let store = self
            .store
            .lock()
            .map_err(|_| Error::sink("experiment store lock poisoned"))?;
        Ok((store, run_id))
    }
}

impl Tracker for MemoryTracker {
    fn start_run(&mut self, experiment: &str, run_name: &str) -> Result<()> {
        let mut run = RunRecord::new(run_name, experiment);
        run.start();
        self.store
            .lock()
            .map_err(|_| Error::sink("experiment store lock poisoned"))?
            .add_run(run);
        self.run_id = Some(run_name.to_string());
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let (mut store, run_id) = self.lock()?;
        let run = store
            .get_run_mut(run_id)
            .ok_or_else(|| Error::sink(format!("unknown run {run_id}")))?;
        run.log_params(params);
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &EpochMetrics, step: u64) -> Result<()> {
        let (mut store, run_id) = self.lock()?;
        for record in MetricRecord::from_epoch(run_id, step, metrics) {
            store.add_metric(record);
        }
        Ok(())
    }

    fn log_artifact(&mut self, path: &Path) -> Result<()> {
        let (mut store, run_id) = self.lock()?;
        store.add_artifact(ArtifactRecord::from_file(run_id, path)?);
        Ok(())
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let (mut store, run_id) = self.lock()?;
        if store.complete_run(run_id, status) {
            Ok(())
        } else {
            Err(Error::sink(format!("unknown run {run_id}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = dir.path().join("ckpt.pt");
        std::fs::write(&ckpt, b"demo").unwrap();

        let mut tracker = MemoryTracker::new();
        let store = tracker.store();
        tracker.start_run("e", "t1").unwrap();
        tracker
            .log_params(&BTreeMap::from([("batch".to_string(), "8".to_string())]))
            .unwrap();
        tracker
            .log_metrics(&EpochMetrics::from([("val_loss".to_string(), 0.9)]), 1)
            .unwrap();
        tracker.log_artifact(&ckpt).unwrap();
        tracker.end_run(RunStatus::Success).unwrap();

        let store = store.lock().unwrap();
        let run = store.get_run("t1").unwrap();
        assert_eq!(run.status(), RunStatus::Success);
        assert_eq!(run.params()["batch"], "8");
        assert_eq!(store.get_metrics_for_run("t1", "val_loss").len(), 1);
        assert_eq!(store.get_artifacts_for_run("t1")[0].key(), "ckpt.pt");
    }

    #[test]
    fn test_missing_artifact_fails() {
        let mut tracker = MemoryTracker::new();
        tracker.start_run("e", "t1").unwrap();
        assert!(tracker.log_artifact(Path::new("/nonexistent/ckpt.pt")).is_err());
    }
}
