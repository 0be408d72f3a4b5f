//! End-to-end trial scenarios, driven in-process
//!
//! Every scenario captures the event stream in memory and checks the
//! protocol shape the orchestrator relies on.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use trial_driver::experiment::RunStatus;
use trial_driver::sink::{FileTracker, MemoryTracker};
use trial_driver::{
    execute, EpochMetrics, Error, Event, EventEmitter, SinkHandle, SyntheticTrainer, TaskType,
    Tracker, Trainer, TrialConfig, TrialDriver, TrialOutcome,
};

/// Tracker whose every call fails.
struct FailingTracker {
    start_ok: bool,
}

impl Tracker for FailingTracker {
    fn start_run(&mut self, _experiment: &str, _run_name: &str) -> trial_driver::Result<()> {
        if self.start_ok {
            Ok(())
        } else {
            Err(Error::sink("unreachable"))
        }
    }

    fn log_params(&mut self, _params: &BTreeMap<String, String>) -> trial_driver::Result<()> {
        Err(Error::sink("rejected"))
    }

    fn log_metrics(&mut self, _metrics: &EpochMetrics, _step: u64) -> trial_driver::Result<()> {
        Err(Error::sink("rejected"))
    }

    fn log_artifact(&mut self, _path: &Path) -> trial_driver::Result<()> {
        Err(Error::sink("rejected"))
    }

    fn end_run(&mut self, _status: RunStatus) -> trial_driver::Result<()> {
        Err(Error::sink("rejected"))
    }
}

/// Trainer replaying a fixed list of metric records.
struct Replay(Vec<EpochMetrics>);

impl Trainer for Replay {
    fn train_epoch(&mut self, epoch: u32) -> trial_driver::Result<EpochMetrics> {
        Ok(self.0[(epoch - 1) as usize].clone())
    }
}

fn config(artifacts: &Path, extra: Value) -> TrialConfig {
    let mut value = json!({
        "trial_id": "t1",
        "task_type": "classification",
        "patience": 3,
        "artifacts_uri": artifacts.display().to_string(),
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut value, extra) {
        base.extend(extra);
    }
    TrialConfig::from_value(value).unwrap()
}

fn run(driver: TrialDriver<impl Trainer>) -> (TrialOutcome, Vec<Value>) {
    let mut driver = driver.epoch_pause(Duration::ZERO);
    let mut emitter = EventEmitter::new(Vec::new());
    let result = driver.run(&mut emitter).unwrap();
    (TrialOutcome::Completed(result), lines(emitter.get_ref()))
}

fn lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8(output.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn types(events: &[Value]) -> Vec<&str> {
    events.iter().map(|e| e["type"].as_str().unwrap()).collect()
}

// ============================================================================
// Protocol shape
// ============================================================================

#[test]
fn test_classification_trial_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir.path().join("t1"), json!({}));
    let trainer = SyntheticTrainer::new(TaskType::Classification);
    let (outcome, events) = run(TrialDriver::new(cfg, trainer, SinkHandle::Inactive));

    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(types(&events), ["hello", "epoch", "epoch", "epoch", "final"]);

    let hello = &events[0];
    assert_eq!(hello["trial_id"], "t1");
    assert_eq!(hello["actual_batch"], 8);
    assert_eq!(hello["pid"], std::process::id());

    for (i, epoch) in events[1..4].iter().enumerate() {
        assert_eq!(epoch["epoch"], i + 1);
        assert_eq!(epoch["trial_id"], "t1");
        assert!(epoch["metrics"]["val_accuracy"].is_f64());
        assert!(epoch["metrics"]["tokens_per_sec"].is_f64());
    }

    let last = &events[4];
    assert_eq!(last["best"]["name"], "val_accuracy");
    let best = last["best"]["value"].as_f64().unwrap();
    assert!((best - 0.45).abs() < 1e-9);
    let checkpoint = last["checkpoint"].as_str().unwrap();
    assert_eq!(std::fs::read(checkpoint).unwrap(), b"demo");
}

#[test]
fn test_generation_trial_reports_min_perplexity() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "task_type": "generation" }));
    let trainer = SyntheticTrainer::new(TaskType::Generation);
    let (_, events) = run(TrialDriver::new(cfg, trainer, SinkHandle::Inactive));

    let last = events.last().unwrap();
    assert_eq!(last["best"]["name"], "val_perplexity");
    let best = last["best"]["value"].as_f64().unwrap();
    assert!((best - 11.1).abs() < 1e-9);
}

#[test]
fn test_other_task_without_loss_never_stops_and_has_no_best() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "task_type": "ranking", "patience": 1 }));
    let flat = EpochMetrics::from([("val_accuracy".to_string(), 0.5)]);
    let trainer = Replay(vec![flat.clone(), flat.clone(), flat]);
    let (_, events) = run(TrialDriver::new(cfg, trainer, SinkHandle::Inactive));

    assert_eq!(types(&events), ["hello", "epoch", "epoch", "epoch", "final"]);
    let last = events.last().unwrap();
    assert_eq!(last["best"]["name"], "val_loss");
    assert!(last["best"]["value"].is_null());
}

#[test]
fn test_non_finite_loss_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "task_type": "ranking" }));
    let curve = [f64::NAN, 0.9, 0.8]
        .iter()
        .map(|v| EpochMetrics::from([("val_loss".to_string(), *v)]))
        .collect();
    let (_, events) = run(TrialDriver::new(cfg, Replay(curve), SinkHandle::Inactive));

    assert_eq!(types(&events), ["hello", "epoch", "epoch", "epoch", "final"]);
    assert_eq!(events[1]["metrics"], json!({}));
    for epoch in &events[1..4] {
        let decoded: Event = serde_json::from_value(epoch.clone()).unwrap();
        assert_eq!(decoded.kind(), "epoch");
        assert!(epoch["metrics"]
            .as_object()
            .unwrap()
            .values()
            .all(Value::is_f64));
    }
    assert_eq!(events.last().unwrap()["best"]["value"], 0.8);
}

#[test]
fn test_regression_stops_after_patience() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "patience": 1 }));
    let curve = [0.6, 0.4, 0.7]
        .iter()
        .map(|v| EpochMetrics::from([("val_accuracy".to_string(), *v)]))
        .collect();
    let (_, events) = run(TrialDriver::new(cfg, Replay(curve), SinkHandle::Inactive));

    assert_eq!(types(&events), ["hello", "epoch", "epoch", "final"]);
    // Best is the declared objective over observed epochs, not the last value
    assert_eq!(events.last().unwrap()["best"]["value"], 0.6);
}

#[test]
fn test_artifacts_dir_may_already_exist() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("existing");
    std::fs::create_dir_all(&artifacts).unwrap();

    for _ in 0..2 {
        let cfg = config(&artifacts, json!({}));
        let trainer = SyntheticTrainer::new(TaskType::Classification);
        let (outcome, _) = run(TrialDriver::new(cfg, trainer, SinkHandle::Inactive));
        assert_eq!(outcome.exit_code(), 0);
    }
    assert!(artifacts.join("ckpt.pt").is_file());
}

#[test]
fn test_malformed_config_emits_single_error() {
    let mut emitter = EventEmitter::new(Vec::new());
    let outcome = execute(Some("{bad json"), &mut emitter, TrialDriver::from_config).unwrap();

    assert_eq!(outcome.exit_code(), 2);
    let events = lines(emitter.get_ref());
    assert_eq!(types(&events), ["error"]);
    assert!(events[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("bad cfg json"));
}

#[test]
fn test_events_round_trip_through_protocol_type() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "tokenizer": "bpe-32k" }));
    let trainer = SyntheticTrainer::new(TaskType::Classification);
    let mut driver = TrialDriver::new(cfg, trainer, SinkHandle::Inactive).epoch_pause(Duration::ZERO);
    let mut emitter = EventEmitter::new(Vec::new());
    driver.run(&mut emitter).unwrap();

    let text = String::from_utf8(emitter.into_inner()).unwrap();
    let events: Vec<Event> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert!(matches!(&events[0], Event::Hello { tokenizer: Some(t), .. } if t == "bpe-32k"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());
}

// ============================================================================
// Sink behavior
// ============================================================================

#[test]
fn test_failing_sink_does_not_change_events() {
    let dir = tempfile::tempdir().unwrap();

    let baseline = {
        let cfg = config(dir.path(), json!({}));
        let trainer = SyntheticTrainer::new(TaskType::Classification);
        run(TrialDriver::new(cfg, trainer, SinkHandle::Inactive))
    };
    let injected = {
        let cfg = config(dir.path(), json!({}));
        let trainer = SyntheticTrainer::new(TaskType::Classification);
        let sink = SinkHandle::activate(Box::new(FailingTracker { start_ok: true }), "e", "t1");
        assert!(sink.is_active());
        run(TrialDriver::new(cfg, trainer, sink))
    };

    assert_eq!(baseline.0, injected.0);
    let strip = |events: &[Value]| -> Vec<Value> {
        events
            .iter()
            .cloned()
            .map(|mut e| {
                if let Value::Object(map) = &mut e {
                    map.remove("ts");
                }
                e
            })
            .collect()
    };
    assert_eq!(strip(&baseline.1), strip(&injected.1));
}

#[test]
fn test_sink_that_cannot_start_is_inactive() {
    let sink = SinkHandle::activate(Box::new(FailingTracker { start_ok: false }), "e", "t1");
    assert!(!sink.is_active());
}

#[test]
fn test_memory_sink_mirrors_trial() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({ "lr": 0.01, "layers": [2, 4] }));
    let tracker = MemoryTracker::new();
    let store = tracker.store();
    let sink = SinkHandle::activate(Box::new(tracker), cfg.experiment(), cfg.trial_id());
    let trainer = SyntheticTrainer::new(TaskType::Classification);
    run(TrialDriver::new(cfg, trainer, sink));

    let store = store.lock().unwrap();
    let tracked = store.get_run("t1").unwrap();
    assert_eq!(tracked.experiment(), "automat-default");
    assert_eq!(tracked.status(), RunStatus::Success);
    assert_eq!(tracked.params()["lr"], "0.01");
    assert!(!tracked.params().contains_key("layers"));
    assert_eq!(store.get_metrics_for_run("t1", "val_accuracy").len(), 3);
    assert_eq!(store.get_artifacts_for_run("t1")[0].key(), "ckpt.pt");
}

#[test]
fn test_file_sink_layout() {
    let dir = tempfile::tempdir().unwrap();
    let tracking = dir.path().join("mlruns");
    let cfg = config(&dir.path().join("artifacts"), json!({ "experiment": "sweep-1" }));
    let sink = SinkHandle::activate(
        Box::new(FileTracker::new(tracking.clone())),
        cfg.experiment(),
        cfg.trial_id(),
    );
    let trainer = SyntheticTrainer::new(TaskType::Classification);
    run(TrialDriver::new(cfg, trainer, sink));

    let run_dir = tracking.join("sweep-1").join("t1");
    let run_json: Value =
        serde_json::from_slice(&std::fs::read(run_dir.join("run.json")).unwrap()).unwrap();
    assert_eq!(run_json["status"], "Success");
    assert_eq!(run_json["params"]["trial_id"], "t1");
    let metric_lines = std::fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
    assert_eq!(metric_lines.lines().count(), 9);
    assert_eq!(std::fs::read(run_dir.join("artifacts").join("ckpt.pt")).unwrap(), b"demo");
}

#[test]
fn test_sink_closed_as_failed_on_crash() {
    struct Crashing;
    impl Trainer for Crashing {
        fn train_epoch(&mut self, epoch: u32) -> trial_driver::Result<EpochMetrics> {
            Err(Error::Training {
                epoch,
                message: "segfault in kernel".into(),
            })
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path(), json!({}));
    let tracker = MemoryTracker::new();
    let store = tracker.store();
    let sink = SinkHandle::activate(Box::new(tracker), "e", "t1");
    let mut driver = TrialDriver::new(cfg, Crashing, sink);
    let mut emitter = EventEmitter::new(Vec::new());

    assert!(driver.run(&mut emitter).is_err());
    assert_eq!(types(&lines(emitter.get_ref())), ["hello"]);
    assert_eq!(store.lock().unwrap().get_run("t1").unwrap().status(), RunStatus::Failed);
}
