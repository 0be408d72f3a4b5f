//! Metrics sink adapter
//!
//! Best-effort mirroring of a trial to an experiment-tracking backend. The
//! sink is a pure side channel: nothing it does can change the event stream,
//! the trial's control flow, or the exit code.
//!
//! Activation happens once, in [`SinkHandle::configure`]. If no backend is
//! configured, or the backend cannot start a run, the handle is
//! [`SinkHandle::Inactive`] and every later call is a no-op. Errors from an
//! active backend are discarded at the handle.
//!
//! | `MLFLOW_TRACKING_URI`        | backend          |
//! |------------------------------|------------------|
//! | unset or empty               | inactive         |
//! | `http://...`, `https://...`  | [`RestTracker`]  |
//! | `file:///dir`, `/dir`, `dir` | [`FileTracker`]  |
//! | any other scheme             | inactive         |
//!
//! [`FileTracker`] writes plain JSON files, not an MLflow file store.

mod file;
mod memory;
mod rest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use file::FileTracker;
pub use memory::MemoryTracker;
pub use rest::RestTracker;

use crate::experiment::RunStatus;
use crate::training::EpochMetrics;
use crate::Result;

/// Environment variable naming the tracking backend.
pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";

/// A tracking backend. Every call may fail; [`SinkHandle`] absorbs failures.
pub trait Tracker {
    /// Open a run named `run_name` under `experiment`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the run.
    fn start_run(&mut self, experiment: &str, run_name: &str) -> Result<()>;

    /// Record run parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the call.
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()>;

    /// Record one epoch's metrics at `step`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the call.
    fn log_metrics(&mut self, metrics: &EpochMetrics, step: u64) -> Result<()>;

    /// Upload or copy a file produced by the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or stored.
    fn log_artifact(&mut self, path: &Path) -> Result<()>;

    /// Close the run with a final status.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the call.
    fn end_run(&mut self, status: RunStatus) -> Result<()>;
}

/// Pick a backend for a tracking URI. `None` means the sink stays inactive.
#[must_use]
pub fn tracker_for_uri(uri: &str) -> Option<Box<dyn Tracker>> {
    let uri = uri.trim();
    if uri.is_empty() {
        return None;
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return RestTracker::new(uri).ok().map(|t| Box::new(t) as Box<dyn Tracker>);
    }
    if let Some(path) = uri.strip_prefix("file://") {
        return Some(Box::new(FileTracker::new(PathBuf::from(path))));
    }
    if uri.contains("://") {
        return None;
    }
    Some(Box::new(FileTracker::new(PathBuf::from(uri))))
}

/// Handle on the tracking sink, passed into the trial driver.
pub enum SinkHandle {
    /// A backend with an open run
    Active(Box<dyn Tracker>),
    /// No tracking; every call is a no-op
    Inactive,
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(_) => f.write_str("SinkHandle::Active"),
            Self::Inactive => f.write_str("SinkHandle::Inactive"),
        }
    }
}

impl SinkHandle {
    /// Activate the sink from the process environment.
    #[must_use]
    pub fn configure(experiment: &str, run_name: &str) -> Self {
        let uri = std::env::var(TRACKING_URI_ENV).ok();
        Self::from_uri(uri.as_deref(), experiment, run_name)
    }

    /// Activate the sink from an explicit tracking URI.
    #[must_use]
    pub fn from_uri(uri: Option<&str>, experiment: &str, run_name: &str) -> Self {
        match uri.and_then(tracker_for_uri) {
            Some(tracker) => Self::activate(tracker, experiment, run_name),
            None => Self::Inactive,
        }
    }

    /// Start a run on `tracker`; stay inactive if that fails.
    #[must_use]
    pub fn activate(mut tracker: Box<dyn Tracker>, experiment: &str, run_name: &str) -> Self {
        match tracker.start_run(experiment, run_name) {
            Ok(()) => Self::Active(tracker),
            Err(_) => Self::Inactive,
        }
    }

    /// Whether a backend is attached.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    /// Forward run parameters.
    pub fn log_params(&mut self, params: &BTreeMap<String, String>) {
        if let Self::Active(tracker) = self {
            let _ = tracker.log_params(params);
        }
    }

    /// Forward one epoch's metrics.
    pub fn log_metrics(&mut self, metrics: &EpochMetrics, step: u64) {
        if let Self::Active(tracker) = self {
            let _ = tracker.log_metrics(metrics, step);
        }
    }

    /// Forward an artifact.
    pub fn log_artifact(&mut self, path: &Path) {
        if let Self::Active(tracker) = self {
            let _ = tracker.log_artifact(path);
        }
    }

    /// Close the run and detach the backend.
    pub fn end(&mut self, status: RunStatus) {
        if let Self::Active(mut tracker) = std::mem::replace(self, Self::Inactive) {
            let _ = tracker.end_run(status);
        }
    }
}
