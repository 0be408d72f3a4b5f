//! Heartbeat event protocol
//!
//! The trial's stdout is a newline-delimited JSON stream. Each line is one
//! [`Event`], written in a single call and flushed before [`EventEmitter::emit`]
//! returns, so the orchestrator never observes a partial line.
//!
//! ```text
//! {"type":"hello","trial_id":"t1","hostname":"gpu-3","pid":4242,"ts":"...Z","tokenizer":null,"actual_batch":8}
//! {"type":"epoch","trial_id":"t1","epoch":1,"metrics":{"val_accuracy":0.35,...}}
//! {"type":"final","trial_id":"t1","best":{"name":"val_accuracy","value":0.45},"checkpoint":"/tmp/t1/ckpt.pt"}
//! ```

use std::io::Write;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::training::EpochMetrics;
use crate::Result;

/// Best value of the objective metric over the trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestMetric {
    /// Objective metric name (e.g. `val_accuracy`)
    pub name: String,
    /// Raw metric value, `None` if the metric was never observed
    pub value: Option<f64>,
}

/// One record of the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// Emitted once when the trial starts running.
    Hello {
        /// Trial id
        trial_id: String,
        /// Host running the trial
        hostname: String,
        /// Process id
        pid: u32,
        /// ISO-8601 UTC timestamp, `Z`-suffixed
        ts: String,
        /// Tokenizer from the config
        tokenizer: Option<String>,
        /// Effective batch size
        actual_batch: u32,
    },
    /// Emitted once per completed epoch.
    Epoch {
        /// Trial id
        trial_id: String,
        /// 1-based epoch number
        epoch: u32,
        /// Full metrics record of the epoch
        metrics: EpochMetrics,
    },
    /// Terminal event of a successful trial.
    Final {
        /// Trial id
        trial_id: String,
        /// Best objective value
        best: BestMetric,
        /// Path of the written checkpoint
        checkpoint: String,
    },
    /// Terminal event of a trial rejected at startup.
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl Event {
    /// Build a `hello` event stamped with this host, pid, and the current time.
    #[must_use]
    pub fn hello(trial_id: impl Into<String>, tokenizer: Option<String>, actual_batch: u32) -> Self {
        Self::Hello {
            trial_id: trial_id.into(),
            hostname: hostname(),
            pid: std::process::id(),
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            tokenizer,
            actual_batch,
        }
    }

    /// Build an `error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this event ends the stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Error { .. })
    }

    /// Value of the `type` tag.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Epoch { .. } => "epoch",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }
}

/// Writes events to the report channel, one flushed line per event.
#[derive(Debug)]
pub struct EventEmitter<W: Write> {
    out: W,
}

impl EventEmitter<std::io::Stdout> {
    /// Emitter over the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> EventEmitter<W> {
    /// Wrap an output channel.
    pub const fn new(out: W) -> Self {
        Self { out }
    }

    /// Serialize `event` and write it as one line, then flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be written or flushed. The
    /// caller must treat this as fatal.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        // Encode fully before touching the channel so a failure never leaves half a line
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.out.write_all(&line)?;
        self.out.flush()?;
        Ok(())
    }

    /// Borrow the underlying channel.
    pub const fn get_ref(&self) -> &W {
        &self.out
    }

    /// Recover the underlying channel.
    pub fn into_inner(self) -> W {
        self.out
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/proc/sys/kernel/hostname")
                .or_else(|_| std::fs::read_to_string("/etc/hostname"))
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}
