//! Trial configuration
//!
//! The orchestrator hands each trial a single JSON object. It is parsed and
//! validated once into an immutable [`TrialConfig`]; nothing mutates it
//! afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Patience used when the config does not name one.
pub const DEFAULT_PATIENCE: u32 = 3;

/// Batch size reported when the config does not name one.
pub const DEFAULT_BATCH: u32 = 8;

/// Tracking experiment used when the config does not name one.
pub const DEFAULT_EXPERIMENT: &str = "automat-default";

/// Kind of task being trained. Decides which metric drives early stopping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "String")]
pub enum TaskType {
    /// Optimizes `val_accuracy` (higher is better)
    #[default]
    Classification,
    /// Optimizes `val_perplexity` (lower is better)
    Generation,
    /// Any other task; optimizes `val_loss` (lower is better)
    Other(String),
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "classification" => Self::Classification,
            "generation" => Self::Generation,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification => f.write_str("classification"),
            Self::Generation => f.write_str("generation"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Fields the driver itself understands. Everything else in the object is
/// only forwarded to the tracking sink.
#[derive(Debug, Deserialize)]
struct RawTrialConfig {
    trial_id: Option<String>,
    artifacts_uri: Option<String>,
    task_type: Option<TaskType>,
    patience: Option<u32>,
    tokenizer: Option<String>,
    batch: Option<u32>,
    experiment: Option<String>,
}

/// Immutable configuration of one trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialConfig {
    trial_id: String,
    artifacts_uri: PathBuf,
    task_type: TaskType,
    patience: u32,
    tokenizer: Option<String>,
    batch: u32,
    experiment: String,
    params: BTreeMap<String, String>,
}

impl TrialConfig {
    /// Parse the trial configuration argument.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not JSON, is not an object,
    /// or a known field has the wrong type or a non-positive value.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::config(format!("bad cfg json: {e}")))?;
        Self::from_value(value)
    }

    /// Build a configuration from an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`TrialConfig::from_json`].
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(Error::config("bad cfg json: expected a JSON object"));
        };
        let params = run_params(&object);
        let raw: RawTrialConfig = serde_json::from_value(Value::Object(object))
            .map_err(|e| Error::config(format!("bad cfg: {e}")))?;

        let patience = raw.patience.unwrap_or(DEFAULT_PATIENCE);
        if patience == 0 {
            return Err(Error::config("bad cfg: patience must be a positive integer"));
        }
        let batch = raw.batch.unwrap_or(DEFAULT_BATCH);
        if batch == 0 {
            return Err(Error::config("bad cfg: batch must be a positive integer"));
        }

        let trial_id = raw
            .trial_id
            .unwrap_or_else(|| format!("trial-{}", Utc::now().timestamp()));
        let artifacts_uri = raw
            .artifacts_uri
            .map_or_else(|| std::env::temp_dir().join(&trial_id), PathBuf::from);

        Ok(Self {
            trial_id,
            artifacts_uri,
            task_type: raw.task_type.unwrap_or_default(),
            patience,
            tokenizer: raw.tokenizer,
            batch,
            experiment: raw
                .experiment
                .unwrap_or_else(|| DEFAULT_EXPERIMENT.to_string()),
            params,
        })
    }

    /// Unique id of this trial.
    #[must_use]
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Directory receiving the trial's artifacts.
    #[must_use]
    pub fn artifacts_uri(&self) -> &std::path::Path {
        &self.artifacts_uri
    }

    /// Task type deciding the primary metric.
    #[must_use]
    pub const fn task_type(&self) -> &TaskType {
        &self.task_type
    }

    /// Consecutive non-improving epochs tolerated before stopping.
    #[must_use]
    pub const fn patience(&self) -> u32 {
        self.patience
    }

    /// Tokenizer name, if any.
    #[must_use]
    pub fn tokenizer(&self) -> Option<&str> {
        self.tokenizer.as_deref()
    }

    /// Effective batch size.
    #[must_use]
    pub const fn batch(&self) -> u32 {
        self.batch
    }

    /// Tracking experiment name.
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Scalar entries of the original object, stringified for the sink.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

fn run_params(object: &Map<String, Value>) -> BTreeMap<String, String> {
    object
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), text))
        })
        .collect()
}
