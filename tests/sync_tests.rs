// Sync orchestrator tests: window, filtering, generator ordering, fail-fast, checkpoint commit

mod common;

use chrono::{DateTime, Duration, Utc};
use common::*;
use statsync::sync::{
    GenerateRequest, GeneratorTables, Stage, SyncError, SyncOrchestrator, SyncSettings,
};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Calls = Arc<Mutex<Vec<(String, GenerateRequest)>>>;

fn settings() -> SyncSettings {
    SyncSettings {
        max_window: Duration::days(7),
        default_backfill: Duration::days(28),
    }
}

/// Generator that records `(label, request)` and optionally fails.
fn recorder(
    calls: &Calls,
    label: &str,
    fail: bool,
) -> impl Fn(GenerateRequest) -> std::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
    let calls = calls.clone();
    let label = label.to_string();
    move |req| {
        calls.lock().unwrap().push((label.clone(), req));
        if fail {
            std::future::ready(Err(anyhow::anyhow!("{} failed", label)))
        } else {
            std::future::ready(Ok(()))
        }
    }
}

fn labels(calls: &Calls) -> Vec<String> {
    calls.lock().unwrap().iter().map(|(l, _)| l.clone()).collect()
}

fn orchestrator(
    backend: Arc<MemoryBackend>,
    ignored: &[&str],
    tables: GeneratorTables,
) -> SyncOrchestrator<MemoryBackend, MemoryBackend, statsync::config::ProjectRegistry> {
    SyncOrchestrator::new(
        backend.clone(),
        backend,
        Arc::new(registry(vec![project("p", ignored)])),
        tables,
        settings(),
    )
}

fn no_shutdown() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    std::mem::forget(tx);
    rx
}

#[tokio::test]
async fn end_to_end_pass_advances_checkpoint() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    backend
        .units
        .lock()
        .unwrap()
        .push(unit("p", "patch", ts(1, 1, 10), &["t1", "t2"]));

    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("test", recorder(&calls, "hourly", false))
        .daily("test", recorder(&calls, "daily", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let now = ts(1, 2, 0);
    let report = orch.run_at("p", now, &no_shutdown()).await.unwrap();

    assert_eq!(backend.processed_until("p"), Some(now));
    assert_eq!(report.window.from, ts(1, 1, 0));
    assert_eq!(report.window.to, now);
    assert_eq!(report.hourly_calls, 1);
    assert_eq!(report.daily_calls, 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    let tasks = vec!["t1".to_string(), "t2".to_string()];
    assert_eq!(calls[0].0, "hourly");
    assert_eq!(
        calls[0].1,
        GenerateRequest {
            project_id: "p".into(),
            requester: "patch".into(),
            period_start: ts(1, 1, 10),
            tasks: tasks.clone(),
            job_time: now,
        }
    );
    assert_eq!(calls[1].0, "daily");
    assert_eq!(
        calls[1].1,
        GenerateRequest {
            project_id: "p".into(),
            requester: "patch".into(),
            period_start: ts(1, 1, 0),
            tasks,
            job_time: now,
        }
    );
}

#[tokio::test]
async fn hourly_failure_is_fail_fast_and_leaves_checkpoint() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    backend
        .units
        .lock()
        .unwrap()
        .push(unit("p", "patch", ts(1, 1, 10), &["t1"]));

    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("a", recorder(&calls, "hourly-a", false))
        .hourly("b", recorder(&calls, "hourly-b", true))
        .hourly("c", recorder(&calls, "hourly-c", false))
        .daily("test", recorder(&calls, "daily", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let err = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap_err();
    match err {
        SyncError::Generator {
            stage,
            name,
            project_id,
            period,
            ..
        } => {
            assert_eq!(stage, Stage::Hourly);
            assert_eq!(name, "b");
            assert_eq!(project_id, "p");
            assert_eq!(period, ts(1, 1, 10));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(labels(&calls), vec!["hourly-a", "hourly-b"]);
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

#[tokio::test]
async fn daily_failure_leaves_checkpoint_and_same_window_is_retried() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    backend
        .units
        .lock()
        .unwrap()
        .push(unit("p", "patch", ts(1, 1, 10), &["t1"]));

    let calls: Calls = Arc::default();
    let failing = GeneratorTables::new()
        .hourly("test", recorder(&calls, "hourly", false))
        .daily("test", recorder(&calls, "daily", true));
    let orch = orchestrator(backend.clone(), &[], failing);
    assert!(orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.is_err());
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));

    let healthy = GeneratorTables::new()
        .hourly("test", recorder(&calls, "hourly", false))
        .daily("test", recorder(&calls, "daily", false));
    let orch = orchestrator(backend.clone(), &[], healthy);
    orch.run_at("p", ts(1, 2, 1), &no_shutdown()).await.unwrap();

    let fetches = backend.fetches.lock().unwrap().clone();
    assert_eq!(fetches.len(), 2);
    assert_eq!(fetches[0].1, fetches[1].1);
    assert_eq!(backend.processed_until("p"), Some(ts(1, 2, 1)));
    assert_eq!(labels(&calls), vec!["hourly", "daily", "hourly", "daily"]);
}

#[tokio::test]
async fn all_hourly_calls_precede_daily_calls() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    {
        let mut units = backend.units.lock().unwrap();
        units.push(unit("p", "patch", ts(1, 1, 10), &["t1"]));
        units.push(unit("p", "gitter", ts(1, 1, 11), &["t2"]));
        units.push(unit("p", "patch", ts(1, 2, 3), &["t3"]));
    }
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("test", recorder(&calls, "hourly", false))
        .daily("task", recorder(&calls, "daily-task", false))
        .daily("test", recorder(&calls, "daily-test", false));
    let orch = orchestrator(backend, &[], tables);

    let report = orch.run_at("p", ts(1, 3, 0), &no_shutdown()).await.unwrap();
    assert_eq!(report.hourly_calls, 3);
    assert_eq!(report.daily_calls, 6);
    let labels = labels(&calls);
    let first_daily = labels.iter().position(|l| l.starts_with("daily")).unwrap();
    assert!(labels[..first_daily].iter().all(|l| l == "hourly"));
    assert!(labels[first_daily..].iter().all(|l| l.starts_with("daily")));
}

#[tokio::test]
async fn ignored_tasks_are_dropped_from_both_stages() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    {
        let mut units = backend.units.lock().unwrap();
        units.push(unit("p", "patch", ts(1, 1, 10), &["gen_x", "keep_y"]));
        units.push(unit("p", "patch", ts(1, 1, 11), &["gen_only"]));
    }
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("test", recorder(&calls, "hourly", false))
        .daily("test", recorder(&calls, "daily", false));
    let orch = orchestrator(backend, &["  ^gen_", ""], tables);

    let report = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap();
    assert_eq!(report.units_fetched, 2);
    assert_eq!(report.units_processed, 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    for (_, req) in calls.iter() {
        assert_eq!(req.tasks, vec!["keep_y".to_string()]);
    }
}

#[tokio::test]
async fn invalid_ignore_pattern_aborts_before_fetch() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new().hourly("test", recorder(&calls, "hourly", false));
    let orch = orchestrator(backend.clone(), &["(["], tables);

    let err = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
    assert_eq!(backend.fetch_count(), 0);
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

#[tokio::test]
async fn fetch_failure_leaves_checkpoint() {
    let backend = Arc::new(MemoryBackend {
        fail_fetch: true,
        ..MemoryBackend::with_checkpoint("p", ts(1, 1, 0))
    });
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new().hourly("test", recorder(&calls, "hourly", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let err = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(_)));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

#[tokio::test]
async fn checkpoint_read_failure_aborts() {
    let backend = Arc::new(MemoryBackend {
        fail_checkpoint_read: true,
        ..MemoryBackend::default()
    });
    let orch = orchestrator(backend.clone(), &[], GeneratorTables::new());
    let err = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap_err();
    assert!(matches!(err, SyncError::Checkpoint(_)));
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn project_config_failure_aborts() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    let orch = SyncOrchestrator::new(
        backend.clone(),
        backend.clone(),
        Arc::new(BrokenProjects),
        GeneratorTables::new(),
        settings(),
    );
    let err = orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap_err();
    assert!(matches!(err, SyncError::ProjectConfig(_)));
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn stalled_project_catches_up_one_window_per_pass() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    let orch = orchestrator(backend.clone(), &[], GeneratorTables::new());
    let now = ts(1, 21, 0);

    orch.run_at("p", now, &no_shutdown()).await.unwrap();
    assert_eq!(backend.processed_until("p"), Some(ts(1, 8, 0)));
    orch.run_at("p", now, &no_shutdown()).await.unwrap();
    assert_eq!(backend.processed_until("p"), Some(ts(1, 15, 0)));
    orch.run_at("p", now, &no_shutdown()).await.unwrap();
    assert_eq!(backend.processed_until("p"), Some(now));
}

#[tokio::test]
async fn missing_checkpoint_starts_from_default_backfill() {
    let backend = Arc::new(MemoryBackend::default());
    let orch = orchestrator(backend.clone(), &[], GeneratorTables::new());
    let now = ts(3, 1, 0);

    let report = orch.run_at("p", now, &no_shutdown()).await.unwrap();
    let expected_from: DateTime<Utc> = now - Duration::days(28);
    assert_eq!(report.window.from, expected_from);
    assert_eq!(report.window.to, expected_from + Duration::days(7));
    assert_eq!(backend.processed_until("p"), Some(report.window.to));
}

#[tokio::test]
async fn cancellation_aborts_without_advancing() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    backend
        .units
        .lock()
        .unwrap()
        .push(unit("p", "patch", ts(1, 1, 10), &["t1"]));
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new().hourly("test", recorder(&calls, "hourly", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let err = orch.run_at("p", ts(1, 2, 0), &rx).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

/// Hourly generator that records its call and then requests shutdown.
fn cancelling_recorder(
    calls: &Calls,
    label: &str,
    shutdown: Arc<watch::Sender<bool>>,
) -> impl Fn(GenerateRequest) -> std::future::Ready<anyhow::Result<()>> + Send + Sync + 'static {
    let record = recorder(calls, label, false);
    move |req| {
        let _ = shutdown.send(true);
        record(req)
    }
}

#[tokio::test]
async fn cancellation_between_hourly_calls_stops_the_pass() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    {
        let mut units = backend.units.lock().unwrap();
        units.push(unit("p", "patch", ts(1, 1, 10), &["t1"]));
        units.push(unit("p", "patch", ts(1, 1, 11), &["t2"]));
    }
    let (tx, rx) = watch::channel(false);
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("a", cancelling_recorder(&calls, "hourly-a", Arc::new(tx)))
        .hourly("b", recorder(&calls, "hourly-b", false))
        .daily("d", recorder(&calls, "daily", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let err = orch.run_at("p", ts(1, 2, 0), &rx).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(labels(&calls), vec!["hourly-a"]);
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

#[tokio::test]
async fn cancellation_after_hourly_stage_skips_daily() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    backend
        .units
        .lock()
        .unwrap()
        .push(unit("p", "patch", ts(1, 1, 10), &["t1"]));
    let (tx, rx) = watch::channel(false);
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new()
        .hourly("a", cancelling_recorder(&calls, "hourly", Arc::new(tx)))
        .daily("d", recorder(&calls, "daily", false));
    let orch = orchestrator(backend.clone(), &[], tables);

    let err = orch.run_at("p", ts(1, 2, 0), &rx).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(labels(&calls), vec!["hourly"]);
    assert_eq!(backend.processed_until("p"), Some(ts(1, 1, 0)));
}

#[tokio::test]
async fn oversized_window_and_backfill_do_not_panic() {
    let huge = SyncSettings {
        max_window: Duration::MAX,
        default_backfill: Duration::MAX,
    };
    let now = ts(1, 2, 0);

    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    let orch = SyncOrchestrator::new(
        backend.clone(),
        backend.clone(),
        Arc::new(registry(vec![project("p", &[])])),
        GeneratorTables::new(),
        huge,
    );
    let report = orch.run_at("p", now, &no_shutdown()).await.unwrap();
    assert_eq!(report.window.to, now);
    assert_eq!(backend.processed_until("p"), Some(now));

    let fresh = Arc::new(MemoryBackend::default());
    let orch = SyncOrchestrator::new(
        fresh.clone(),
        fresh.clone(),
        Arc::new(registry(vec![project("p", &[])])),
        GeneratorTables::new(),
        huge,
    );
    let report = orch.run_at("p", now, &no_shutdown()).await.unwrap();
    assert_eq!(report.window.from, DateTime::<Utc>::MIN_UTC);
    assert_eq!(report.window.to, now);
}

#[tokio::test]
async fn daily_buckets_are_not_deduplicated() {
    let backend = Arc::new(MemoryBackend::with_checkpoint("p", ts(1, 1, 0)));
    {
        let mut units = backend.units.lock().unwrap();
        units.push(unit("p", "patch", ts(1, 1, 10), &["a"]));
        units.push(unit("p", "patch", ts(1, 1, 11), &["a", "b"]));
    }
    let calls: Calls = Arc::default();
    let tables = GeneratorTables::new().daily("test", recorder(&calls, "daily", false));
    let orch = orchestrator(backend, &[], tables);

    orch.run_at("p", ts(1, 2, 0), &no_shutdown()).await.unwrap();
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1.tasks, vec!["a", "a", "b"]);
}
