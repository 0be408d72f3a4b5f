//! MLflow REST tracking backend

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::Tracker;
use crate::experiment::RunStatus;
use crate::training::EpochMetrics;
use crate::{Error, Result};

/// Upper bound on every tracking request; sink latency is part of trial wall time.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Artifact URIs with this prefix are served by the tracking server's proxy.
const PROXIED_ARTIFACTS: &str = "mlflow-artifacts:";

/// Server-side limit on params in one `runs/log-batch` request.
const MAX_PARAMS_PER_BATCH: usize = 100;

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Debug, Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunBody,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Debug, Deserialize)]
struct RunInfo {
    run_id: String,
    #[serde(default)]
    artifact_uri: Option<String>,
}

/// Tracks runs on an MLflow tracking server over its REST API.
#[derive(Debug)]
pub struct RestTracker {
    client: Client,
    base_url: String,
    run: Option<RunInfo>,
}

impl RestTracker {
    /// Client for the tracking server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            run: None,
        })
    }

    /// Server base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base_url)
    }

    fn run_id(&self) -> Result<&str> {
        self.run
            .as_ref()
            .map(|r| r.run_id.as_str())
            .ok_or_else(|| Error::sink("no run started"))
    }

    fn experiment_id(&self, name: &str) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint("experiments/get-by-name"))
            .query(&[("experiment_name", name)])
            .send()?;
        if response.status() != StatusCode::NOT_FOUND {
            let found: ExperimentResponse = response.error_for_status()?.json()?;
            return Ok(found.experiment.experiment_id);
        }
        let created: CreateExperimentResponse = self
            .client
            .post(self.endpoint("experiments/create"))
            .json(&json!({ "name": name }))
            .send()?
            .error_for_status()?
            .json()?;
        Ok(created.experiment_id)
    }

    fn log_batch(&self, body: &serde_json::Value) -> Result<()> {
        self.client
            .post(self.endpoint("runs/log-batch"))
            .json(body)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

/// `runs/log-batch` bodies for `params`, at most [`MAX_PARAMS_PER_BATCH`] each.
fn param_batches(run_id: &str, params: &BTreeMap<String, String>) -> Vec<serde_json::Value> {
    let params: Vec<_> = params
        .iter()
        .map(|(key, value)| json!({ "key": key, "value": value }))
        .collect();
    params
        .chunks(MAX_PARAMS_PER_BATCH)
        .map(|chunk| json!({ "run_id": run_id, "params": chunk }))
        .collect()
}

/// Path of an artifact under the server's artifact proxy.
fn proxied_artifact_path(artifact_uri: &str, file_name: &str) -> Option<String> {
    let rest = artifact_uri.strip_prefix(PROXIED_ARTIFACTS)?;
    let rest = rest.trim_start_matches('/').trim_end_matches('/');
    Some(format!("{rest}/{file_name}"))
}

impl Tracker for RestTracker {
    fn start_run(&mut self, experiment: &str, run_name: &str) -> Result<()> {
        let experiment_id = self.experiment_id(experiment)?;
        let created: RunResponse = self
            .client
            .post(self.endpoint("runs/create"))
            .json(&json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": Utc::now().timestamp_millis(),
            }))
            .send()?
            .error_for_status()?
            .json()?;
        self.run = Some(created.run.info);
        Ok(())
    }

    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<()> {
        let run_id = self.run_id()?;
        for batch in param_batches(run_id, params) {
            self.log_batch(&batch)?;
        }
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &EpochMetrics, step: u64) -> Result<()> {
        let timestamp = Utc::now().timestamp_millis();
        let metrics: Vec<_> = metrics
            .iter()
            .map(|(key, value)| {
                json!({ "key": key, "value": value, "timestamp": timestamp, "step": step })
            })
            .collect();
        let run_id = self.run_id()?;
        self.log_batch(&json!({ "run_id": run_id, "metrics": metrics }))
    }

    fn log_artifact(&mut self, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::sink(format!("not a file: {}", path.display())))?;
        let artifact_uri = self
            .run
            .as_ref()
            .and_then(|r| r.artifact_uri.as_deref())
            .ok_or_else(|| Error::sink("run has no artifact location"))?;
        let target = proxied_artifact_path(artifact_uri, &file_name)
            .ok_or_else(|| Error::sink(format!("artifact store not proxied: {artifact_uri}")))?;

        let content = std::fs::read(path)?;
        self.client
            .put(format!(
                "{}/api/2.0/mlflow-artifacts/artifacts/{target}",
                self.base_url
            ))
            .body(content)
            .send()?
            .error_for_status()?;
        Ok(())
    }

    fn end_run(&mut self, status: RunStatus) -> Result<()> {
        let run_id = self.run_id()?.to_string();
        self.client
            .post(self.endpoint("runs/update"))
            .json(&json!({
                "run_id": run_id,
                "status": status.as_mlflow(),
                "end_time": Utc::now().timestamp_millis(),
            }))
            .send()?
            .error_for_status()?;
        self.run = None;
        Ok(())
    }
}
