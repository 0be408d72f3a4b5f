//! # trial-driver: Single-Trial Worker for Hyperparameter Search
//!
//! A parent scheduler launches one `trial-driver` process per configuration.
//! Each process trains for a bounded number of epochs, stops early when the
//! task's primary metric stops improving, and reports everything it does as
//! newline-delimited JSON on stdout.
//!
//! ## Design Principles
//!
//! - **One channel**: stdout carries only protocol events, flushed per line;
//!   diagnostics go to stderr through `tracing`
//! - **One terminal event**: every run that does not crash ends with exactly
//!   one `final` or `error`
//! - **Side channels never steer**: the tracking sink can fail in any way
//!   without changing events or exit codes
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trial_driver::{execute, EventEmitter, TrialDriver};
//!
//! let mut emitter = EventEmitter::stdout();
//! let outcome = execute(
//!     Some(r#"{"trial_id":"t1","task_type":"classification","patience":3}"#),
//!     &mut emitter,
//!     TrialDriver::from_config,
//! )?;
//! assert_eq!(outcome.exit_code(), 0);
//! # Ok::<(), trial_driver::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod experiment;
pub mod policy;
pub mod sink;
pub mod training;

pub use config::{TaskType, TrialConfig};
pub use driver::{execute, TrialDriver, TrialOutcome, TrialResult, TrialState};
pub use error::{Error, Result};
pub use event::{BestMetric, Event, EventEmitter};
pub use policy::{primary_metric, EarlyStopState, EarlyStopping, StopDecision};
pub use sink::{SinkHandle, Tracker};
pub use training::{EpochMetrics, SyntheticTrainer, Trainer};
