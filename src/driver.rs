//! Trial driver
//!
//! Runs one trial through its lifecycle and guarantees the event stream ends
//! with exactly one terminal event on every non-crashing path:
//!
//! ```text
//! Created ──(bad config)──> Failed          emits: error
//!    │
//!    └──> Running(1..=N) ──> Finalizing ──> Done
//!          emits: hello,      emits: final
//!                 epoch × k
//! ```
//!
//! The epoch loop leaves `Running` either when the early-stopping policy asks
//! to stop or when the epoch bound is reached. Any I/O or training failure
//! after `hello` propagates to the caller without a terminal event; the
//! orchestrator reads a stream that ends early as a crash.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::TrialConfig;
use crate::event::{BestMetric, Event, EventEmitter};
use crate::experiment::RunStatus;
use crate::policy::{primary_metric, BestTracker, EarlyStopping, StopDecision};
use crate::sink::SinkHandle;
use crate::training::{finite_metrics, SyntheticTrainer, Trainer};
use crate::{Error, Result};

/// Epoch bound of the smoke-test training loop.
pub const MAX_EPOCHS: u32 = 3;

/// Pause between epochs, standing in for real training time.
pub const EPOCH_PAUSE: Duration = Duration::from_millis(200);

/// File name of the checkpoint under the artifacts directory.
pub const CHECKPOINT_FILE: &str = "ckpt.pt";

/// Lifecycle state of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialState {
    /// Configured, not yet started
    Created,
    /// Training the given 1-based epoch
    Running {
        /// Current epoch
        epoch: u32,
    },
    /// Writing the checkpoint and the `final` event
    Finalizing,
    /// `final` emitted
    Done,
}

/// Summary of a successfully finished trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    /// Best objective value observed
    pub best: BestMetric,
    /// Written checkpoint
    pub checkpoint: PathBuf,
}

/// How a trial ended, for trials that did not crash.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// `final` was emitted
    Completed(TrialResult),
    /// Configuration was rejected and `error` was emitted
    Failed {
        /// Reason reported in the `error` event
        message: String,
    },
}

impl TrialOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Completed(_) => 0,
            Self::Failed { .. } => 2,
        }
    }
}

/// Drives one trial from `hello` to `final`.
#[derive(Debug)]
pub struct TrialDriver<T> {
    config: TrialConfig,
    trainer: T,
    sink: SinkHandle,
    max_epochs: u32,
    epoch_pause: Duration,
    state: TrialState,
}

impl TrialDriver<SyntheticTrainer> {
    /// Driver with the synthetic trainer and a sink configured from the environment.
    #[must_use]
    pub fn from_config(config: TrialConfig) -> Self {
        let trainer = SyntheticTrainer::new(config.task_type().clone());
        let sink = SinkHandle::configure(config.experiment(), config.trial_id());
        Self::new(config, trainer, sink)
    }
}

impl<T: Trainer> TrialDriver<T> {
    /// Driver over an explicit trainer and sink.
    #[must_use]
    pub const fn new(config: TrialConfig, trainer: T, sink: SinkHandle) -> Self {
        Self {
            config,
            trainer,
            sink,
            max_epochs: MAX_EPOCHS,
            epoch_pause: EPOCH_PAUSE,
            state: TrialState::Created,
        }
    }

    /// Override the epoch bound.
    #[must_use]
    pub const fn max_epochs(mut self, max_epochs: u32) -> Self {
        self.max_epochs = max_epochs;
        self
    }

    /// Override the pause between epochs.
    #[must_use]
    pub const fn epoch_pause(mut self, pause: Duration) -> Self {
        self.epoch_pause = pause;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TrialState {
        self.state
    }

    /// Trial configuration.
    #[must_use]
    pub const fn config(&self) -> &TrialConfig {
        &self.config
    }

    /// Run the trial to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifacts directory, the checkpoint, or the
    /// event channel cannot be written, or if training fails. No terminal
    /// event is emitted in that case. A driver runs at most once; calling
    /// `run` again returns [`Error::State`] without emitting anything.
    pub fn run<W: Write>(&mut self, emitter: &mut EventEmitter<W>) -> Result<TrialResult> {
        if self.state != TrialState::Created {
            return Err(Error::State(format!("{:?}", self.state)));
        }
        let result = self.run_epochs(emitter).and_then(|best| self.finalize(best, emitter));
        if result.is_err() {
            self.sink.end(RunStatus::Failed);
        }
        result
    }

    fn run_epochs<W: Write>(&mut self, emitter: &mut EventEmitter<W>) -> Result<BestTracker> {
        let config = &self.config;
        fs::create_dir_all(config.artifacts_uri())?;
        self.sink.log_params(config.params());
        emitter.emit(&Event::hello(
            config.trial_id(),
            config.tokenizer().map(str::to_string),
            config.batch(),
        ))?;
        debug!(
            trial_id = config.trial_id(),
            task_type = %config.task_type(),
            patience = config.patience(),
            "trial started"
        );

        let mut stopping = EarlyStopping::new(config.patience());
        let mut best = BestTracker::new(config.task_type());

        for epoch in 1..=self.max_epochs {
            self.state = TrialState::Running { epoch };
            let metrics = self.trainer.train_epoch(epoch)?;
            let pm = primary_metric(self.config.task_type(), &metrics);
            let metrics = finite_metrics(&metrics);
            best.observe(pm);
            let decision = stopping.observe(pm);
            debug!(
                epoch,
                primary = ?pm,
                bad_epochs = stopping.state().bad_epochs,
                "epoch finished"
            );

            emitter.emit(&Event::Epoch {
                trial_id: self.config.trial_id().to_string(),
                epoch,
                metrics: metrics.clone(),
            })?;
            self.sink.log_metrics(&metrics, u64::from(epoch));

            if decision == StopDecision::Stop {
                info!(
                    epoch,
                    patience = stopping.patience(),
                    "early stopping: no improvement"
                );
                break;
            }
            if epoch < self.max_epochs && !self.epoch_pause.is_zero() {
                std::thread::sleep(self.epoch_pause);
            }
        }
        Ok(best)
    }

    fn finalize<W: Write>(
        &mut self,
        best: BestTracker,
        emitter: &mut EventEmitter<W>,
    ) -> Result<TrialResult> {
        self.state = TrialState::Finalizing;
        let summary = best.summary();
        let checkpoint = self.config.artifacts_uri().join(CHECKPOINT_FILE);
        fs::write(&checkpoint, self.trainer.checkpoint()?)?;
        debug!(checkpoint = %checkpoint.display(), "checkpoint written");

        emitter.emit(&Event::Final {
            trial_id: self.config.trial_id().to_string(),
            best: summary.clone(),
            checkpoint: checkpoint.display().to_string(),
        })?;
        self.sink.log_artifact(&checkpoint);
        self.sink.end(RunStatus::Success);
        self.state = TrialState::Done;

        Ok(TrialResult {
            best: summary,
            checkpoint,
        })
    }
}

/// Run a trial from its raw configuration argument.
///
/// A missing or malformed argument is reported as the single `error` event
/// and yields [`TrialOutcome::Failed`]; otherwise `build` turns the parsed
/// configuration into a driver which runs to completion.
///
/// # Errors
///
/// Propagates fatal failures from [`TrialDriver::run`] and event channel
/// failures while reporting a rejected configuration.
pub fn execute<T, W, F>(
    arg: Option<&str>,
    emitter: &mut EventEmitter<W>,
    build: F,
) -> Result<TrialOutcome>
where
    T: Trainer,
    W: Write,
    F: FnOnce(TrialConfig) -> TrialDriver<T>,
{
    let parsed = arg
        .ok_or_else(|| Error::config("missing cfg arg"))
        .and_then(TrialConfig::from_json);
    let config = match parsed {
        Ok(config) => config,
        Err(err) => {
            let message = err.to_string();
            emitter.emit(&Event::error(message.clone()))?;
            return Ok(TrialOutcome::Failed { message });
        }
    };

    let mut driver = build(config);
    driver.run(emitter).map(TrialOutcome::Completed)
}
