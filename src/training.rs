//! Training capability
//!
//! The driver treats training as a black box that yields one metrics record
//! per epoch. [`SyntheticTrainer`] is the smoke-test stand-in used by the
//! binary until a real model is wired in.

use std::collections::BTreeMap;

use crate::config::TaskType;
use crate::Result;

/// Metric name to value, produced once per epoch.
pub type EpochMetrics = BTreeMap<String, f64>;

/// Entries of `metrics` that have a JSON number representation.
#[must_use]
pub fn finite_metrics(metrics: &EpochMetrics) -> EpochMetrics {
    metrics
        .iter()
        .filter(|(_, value)| value.is_finite())
        .map(|(name, &value)| (name.clone(), value))
        .collect()
}

/// Produces epoch metrics for the trial driver.
pub trait Trainer {
    /// Train (and evaluate) one epoch.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Training`] if the epoch cannot be completed.
    fn train_epoch(&mut self, epoch: u32) -> Result<EpochMetrics>;

    /// Serialized model state written as the trial's checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the model state cannot be serialized.
    fn checkpoint(&self) -> Result<Vec<u8>> {
        Ok(PLACEHOLDER_CHECKPOINT.to_vec())
    }
}

/// Checkpoint payload of trainers without real model state.
pub const PLACEHOLDER_CHECKPOINT: &[u8] = b"demo";

impl<T: Trainer + ?Sized> Trainer for Box<T> {
    fn train_epoch(&mut self, epoch: u32) -> Result<EpochMetrics> {
        (**self).train_epoch(epoch)
    }

    fn checkpoint(&self) -> Result<Vec<u8>> {
        (**self).checkpoint()
    }
}

/// Deterministic, steadily improving metric curves.
#[derive(Debug, Clone)]
pub struct SyntheticTrainer {
    task_type: TaskType,
}

impl SyntheticTrainer {
    /// Curves shaped for the given task type.
    #[must_use]
    pub const fn new(task_type: TaskType) -> Self {
        Self { task_type }
    }
}

impl Trainer for SyntheticTrainer {
    fn train_epoch(&mut self, epoch: u32) -> Result<EpochMetrics> {
        let e = f64::from(epoch);
        let metrics = match self.task_type {
            TaskType::Generation => BTreeMap::from([
                ("val_perplexity".to_string(), 0.4f64.mul_add(-e, 12.3)),
                ("tokens_per_sec".to_string(), 60.0f64.mul_add(e, 5200.0)),
            ]),
            TaskType::Classification | TaskType::Other(_) => BTreeMap::from([
                ("val_accuracy".to_string(), 0.05f64.mul_add(e, 0.3)),
                ("val_loss".to_string(), 0.1f64.mul_add(-e, 1.0)),
                ("tokens_per_sec".to_string(), 50.0f64.mul_add(e, 5000.0)),
            ]),
        };
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_curve_improves() {
        let mut trainer = SyntheticTrainer::new(TaskType::Classification);
        let first = trainer.train_epoch(1).unwrap();
        let second = trainer.train_epoch(2).unwrap();
        assert!((first["val_accuracy"] - 0.35).abs() < 1e-9);
        assert!(second["val_accuracy"] > first["val_accuracy"]);
        assert!(second["val_loss"] < first["val_loss"]);
        assert!((first["tokens_per_sec"] - 5050.0).abs() < 1e-9);
    }

    #[test]
    fn test_generation_curve_has_perplexity_only() {
        let mut trainer = SyntheticTrainer::new(TaskType::Generation);
        let metrics = trainer.train_epoch(1).unwrap();
        assert!((metrics["val_perplexity"] - 11.9).abs() < 1e-9);
        assert!(!metrics.contains_key("val_accuracy"));
        assert!(!metrics.contains_key("val_loss"));
    }

    #[test]
    fn test_finite_metrics_drops_nan_and_infinity() {
        let metrics = EpochMetrics::from([
            ("val_loss".to_string(), f64::NAN),
            ("val_accuracy".to_string(), 0.4),
            ("grad_norm".to_string(), f64::INFINITY),
        ]);
        let finite = finite_metrics(&metrics);
        assert_eq!(finite, EpochMetrics::from([("val_accuracy".to_string(), 0.4)]));
    }
}
