//! Error types for the trial driver
//!
//! Only `Config` is ever reported on the event stream. `Sink` errors never
//! leave the sink module; everything else terminates the process.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trial driver error types
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed trial configuration (exit code 2)
    #[error("{0}")]
    Config(String),

    /// The training capability failed to produce epoch metrics
    #[error("Training failed at epoch {epoch}: {message}")]
    Training {
        /// Epoch that was being trained
        epoch: u32,
        /// Failure description
        message: String,
    },

    /// Driver asked to run outside its `Created` state
    #[error("Trial cannot run from state {0}")]
    State(String),

    /// Tracking backend rejected or failed a call
    #[error("Tracking sink error: {0}")]
    Sink(String),

    /// IO error (event channel, artifacts)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error (REST tracking backend)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Build a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Build a sink error.
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Process exit code for this error when it ends the trial.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}
