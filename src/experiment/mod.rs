//! Experiment tracking schema
//!
//! Records mirrored to a tracking sink while a trial runs.
//!
//! ```text
//! experiment name ──< RunRecord (N)      one run per trial
//!                         │
//!                         ├──< MetricRecord (N) [one per metric per epoch]
//!                         └──< ArtifactRecord (N) [checkpoint, CAS]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trial_driver::experiment::{ExperimentStore, MetricRecord, RunRecord, RunStatus};
//!
//! let mut store = ExperimentStore::new();
//!
//! let mut run = RunRecord::new("t1", "automat-default");
//! run.start();
//! store.add_run(run);
//!
//! store.add_metric(MetricRecord::new("t1", "val_accuracy", 1, 0.35));
//! store.complete_run("t1", RunStatus::Success);
//!
//! assert_eq!(store.get_run("t1").map(RunRecord::status), Some(RunStatus::Success));
//! ```

mod artifact_record;
mod metric_record;
mod run_record;
mod store;

pub use artifact_record::ArtifactRecord;
pub use metric_record::MetricRecord;
pub use run_record::{RunRecord, RunStatus};
pub use store::ExperimentStore;
