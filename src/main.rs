//! `trial-driver` binary: run one trial and report it on stdout.
//!
//! Exit codes: `0` trial finished (`final` emitted), `2` missing or malformed
//! configuration (`error` emitted), `1` crash (stream ends without a
//! terminal event).

use std::process::ExitCode;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use trial_driver::{execute, Event, EventEmitter, TrialDriver};

/// Run a single training trial, emitting JSONL heartbeat events on stdout.
#[derive(Parser, Debug)]
#[command(name = "trial-driver", version, about, long_about = None)]
struct Cli {
    /// Trial configuration as a JSON object
    config: Option<String>,

    /// Increase stderr verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout belongs to the event stream
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let mut emitter = EventEmitter::stdout();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let reason = err.kind().as_str().unwrap_or("unexpected input");
            emitter.emit(&Event::error(format!("bad arguments: {reason}")))?;
            return Ok(ExitCode::from(2));
        }
    };
    init_tracing(cli.verbose);

    match execute(cli.config.as_deref(), &mut emitter, TrialDriver::from_config) {
        Ok(outcome) => Ok(ExitCode::from(outcome.exit_code())),
        Err(err) => {
            tracing::error!(error = %err, "trial aborted");
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}
