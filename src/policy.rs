//! Primary-metric and early-stopping policies
//!
//! Every task type is reduced to one "higher is better" scalar, the primary
//! metric, so a single comparison rule drives early stopping:
//!
//! | task type        | objective metric  | primary metric     |
//! |------------------|-------------------|--------------------|
//! | `classification` | `val_accuracy`    | `val_accuracy`     |
//! | `generation`     | `val_perplexity`  | `-val_perplexity`  |
//! | anything else    | `val_loss`        | `-val_loss`        |
//!
//! Epochs without the objective metric produce no signal at all.

use crate::config::TaskType;
use crate::event::BestMetric;
use crate::training::EpochMetrics;

/// Optimization direction of an objective metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Larger values are better
    Maximize,
    /// Smaller values are better
    Minimize,
}

/// The metric a task type optimizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Objective {
    /// Metric name in the epoch metrics record
    pub metric: &'static str,
    /// Optimization direction
    pub direction: Direction,
}

impl Objective {
    /// Objective of a task type.
    #[must_use]
    pub const fn for_task(task_type: &TaskType) -> Self {
        match task_type {
            TaskType::Classification => Self {
                metric: "val_accuracy",
                direction: Direction::Maximize,
            },
            TaskType::Generation => Self {
                metric: "val_perplexity",
                direction: Direction::Minimize,
            },
            TaskType::Other(_) => Self {
                metric: "val_loss",
                direction: Direction::Minimize,
            },
        }
    }

    /// Map a raw metric value into the "higher is better" convention.
    #[must_use]
    pub fn to_primary(self, raw: f64) -> f64 {
        match self.direction {
            Direction::Maximize => raw,
            Direction::Minimize => -raw,
        }
    }

    /// Inverse of [`Objective::to_primary`].
    #[must_use]
    pub fn to_raw(self, primary: f64) -> f64 {
        // Negation is its own inverse
        self.to_primary(primary)
    }
}

/// Primary metric of one epoch, or `None` when the objective metric is missing.
#[must_use]
pub fn primary_metric(task_type: &TaskType, metrics: &EpochMetrics) -> Option<f64> {
    let objective = Objective::for_task(task_type);
    metrics
        .get(objective.metric)
        .map(|&raw| objective.to_primary(raw))
}

/// Decision of the early-stopping policy after an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// Keep training
    Continue,
    /// Patience exhausted
    Stop,
}

/// State carried between epochs by the early-stopping policy.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EarlyStopState {
    /// Primary metric of the last epoch that had one
    pub last_primary: Option<f64>,
    /// Consecutive epochs without strict improvement
    pub bad_epochs: u32,
}

impl EarlyStopState {
    /// Fold one epoch's primary metric into the state.
    ///
    /// Equality counts as no improvement, so plateaus stop a trial just like
    /// regressions. An unavailable metric leaves the state untouched.
    #[must_use]
    pub fn observe(self, pm: Option<f64>, patience: u32) -> (Self, StopDecision) {
        let Some(pm) = pm else {
            return (self, StopDecision::Continue);
        };
        let Some(last) = self.last_primary else {
            let next = Self {
                last_primary: Some(pm),
                bad_epochs: 0,
            };
            return (next, StopDecision::Continue);
        };

        let bad_epochs = if pm <= last { self.bad_epochs + 1 } else { 0 };
        let next = Self {
            last_primary: Some(pm),
            bad_epochs,
        };
        let decision = if bad_epochs >= patience {
            StopDecision::Stop
        } else {
            StopDecision::Continue
        };
        (next, decision)
    }
}

/// Patience-based early stopping over a task's primary metric.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: u32,
    state: EarlyStopState,
}

impl EarlyStopping {
    /// Fresh policy with the given patience.
    #[must_use]
    pub fn new(patience: u32) -> Self {
        Self {
            patience,
            state: EarlyStopState::default(),
        }
    }

    /// Observe one epoch's primary metric.
    pub fn observe(&mut self, pm: Option<f64>) -> StopDecision {
        let (state, decision) = self.state.observe(pm, self.patience);
        self.state = state;
        decision
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> EarlyStopState {
        self.state
    }

    /// Configured patience.
    #[must_use]
    pub const fn patience(&self) -> u32 {
        self.patience
    }
}

/// Best objective value seen over a trial.
#[derive(Debug, Clone)]
pub struct BestTracker {
    objective: Objective,
    best_primary: Option<f64>,
}

impl BestTracker {
    /// Tracker for a task type's objective.
    #[must_use]
    pub const fn new(task_type: &TaskType) -> Self {
        Self {
            objective: Objective::for_task(task_type),
            best_primary: None,
        }
    }

    /// Record one epoch's primary metric. Non-finite values are skipped.
    pub fn observe(&mut self, pm: Option<f64>) {
        if let Some(pm) = pm.filter(|v| v.is_finite()) {
            if self.best_primary.map_or(true, |best| pm > best) {
                self.best_primary = Some(pm);
            }
        }
    }

    /// Summary for the `final` event, in the metric's own units.
    #[must_use]
    pub fn summary(&self) -> BestMetric {
        BestMetric {
            name: self.objective.metric.to_string(),
            value: self.best_primary.map(|pm| self.objective.to_raw(pm)),
        }
    }
}
