//! Run Record - one tracked execution of a trial

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but not yet started.
    Pending,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Success,
    /// Run failed with an error.
    Failed,
    /// Run was cancelled by user or system.
    Cancelled,
}

impl RunStatus {
    /// Status name used by the MLflow REST API.
    #[must_use]
    pub const fn as_mlflow(self) -> &'static str {
        match self {
            Self::Pending => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Success => "FINISHED",
            Self::Failed => "FAILED",
            Self::Cancelled => "KILLED",
        }
    }
}

/// Run Record represents the tracked side of one trial.
///
/// The run id is the trial id. Parameters are the scalar entries of the
/// trial configuration, stringified.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment: String,
    status: RunStatus,
    params: BTreeMap<String, String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run (the trial id)
    /// * `experiment` - Name of the experiment the run belongs to
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment: experiment.into(),
            status: RunStatus::Pending,
            params: BTreeMap::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the logged parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Merge parameters into the run. Later values win.
    pub fn log_params(&mut self, params: &BTreeMap<String, String>) {
        self.params
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Start the run, transitioning from Pending to Running.
    ///
    /// Sets the `started_at` timestamp to now.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with the given final status.
    ///
    /// Sets the `ended_at` timestamp to now.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}
