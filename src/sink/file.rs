//! Directory-backed tracking store
//!
//! The layout is this crate's own and is not an MLflow file store; MLflow
//! tooling cannot read it. Point `MLFLOW_TRACKING_URI` at a tracking server
//! when MLflow compatibility is needed.
//!
//! ```text
//! <root>/<experiment>/<run>/run.json          RunRecord (status, params, timestamps)
//!                          /metrics.jsonl     one MetricRecord per line
//!                          /artifacts.jsonl   one ArtifactRecord per line
//!                          /artifacts/<file>  copied artifact
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::Tracker;
use crate::experiment::{ArtifactRecord, MetricRecord, RunRecord, RunStatus};
use crate::training::EpochMetrics;
use crate::{Error, Result};

/// Tracks runs as plain files under a root directory.
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    run: Option<(PathBuf, RunRecord)>,
}

impl FileTracker {
    /// Tracker rooted at `root`. Nothing is created until a run starts.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root, run: None }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the open run, if any.
    #[must_use]
    pub fn run_dir(&self) -> Option<&Path> {
        self.run.as_ref().map(|(dir, _)| dir.as_path())
    }

    fn open_run(&mut self) -> Result<(&Path, &mut RunRecord)> {
        self.run
            .as_mut()
            .map(|(dir, run)| (dir.as_path(), run))
            .ok_or_else(|| Error::sink("no run started"))
    }

    fn save_run(dir: &Path, run: &RunRecord) -> Result<()> {
        let json = serde_json::to_vec_pretty(run)?;
        fs::write(dir.join("run.json"), json)?;
        Ok(())
    }
}

fn append_lines<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&buf)?;
    Ok(())
}

impl Tracker for FileTracker {
    fn start_run(&mut self, experiment: &str, run_name: &str) -> Result<()> {
        let dir = self.root.join(experiment).join(run_name);
        fs::create_dir_all(&dir)?;
        let mut run = RunRecord::new(run_name, experiment);
        run.start();
        Self::save_run(&dir, &run)?;
        self.run = Some((dir, run));
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let (dir, run) = self.open_run()?;
        run.log_params(params);
        Self::save_run(dir, run)
    }

    fn log_metrics(&mut self, metrics: &EpochMetrics, step: u64) -> Result<()> {
        let (dir, run) = self.open_run()?;
        let records = MetricRecord::from_epoch(run.run_id(), step, metrics);
        append_lines(&dir.join("metrics.jsonl"), &records)
    }

    fn log_artifact(&mut self, path: &Path) -> Result<()> {
        let (dir, run) = self.open_run()?;
        let record = ArtifactRecord::from_file(run.run_id(), path)?;
        let target = dir.join("artifacts");
        fs::create_dir_all(&target)?;
        fs::copy(path, target.join(record.key()))?;
        append_lines(&dir.join("artifacts.jsonl"), &[record])
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let (dir, run) = self.open_run()?;
        run.complete(status);
        Self::save_run(dir, run)
    }
}
