//! Monitoring loop integration tests: scheduled runs, lock retry and alerts.

use std::sync::Arc;
use std::time::Duration;

use steward_core::{
    activity::SqliteActivityLog,
    adapter::AdapterRegistry,
    config::{CoordinatorConfig, MonitorConfig, WorkspaceConfig},
    coordinator::Coordinator,
    monitor::MonitoringLoop,
    notifier::AlertKind,
    run::{RunFilter, RunState, RunTrigger, SqliteRunStore, TerminalStatus},
    testing::{fixtures, MockGroupAdapter, RecordingNotifier},
};

struct TestHarness {
    coordinator: Arc<Coordinator>,
    monitor: MonitoringLoop,
    notifier: RecordingNotifier,
}

impl TestHarness {
    fn new(workspaces: &[WorkspaceConfig], adapters: &[MockGroupAdapter], config: MonitorConfig) -> Self {
        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry.register(Arc::new(adapter.clone())).unwrap();
        }
        let notifier = RecordingNotifier::new();
        let coordinator = Arc::new(
            Coordinator::new(
                workspaces,
                &CoordinatorConfig::default(),
                Arc::new(registry),
                Arc::new(SqliteRunStore::in_memory().unwrap()),
                Arc::new(SqliteActivityLog::in_memory().unwrap()),
            )
            .unwrap()
            .with_notifier(Arc::new(notifier.clone())),
        );
        let monitor = MonitoringLoop::new(
            Arc::clone(&coordinator),
            Arc::new(notifier.clone()),
            config,
        );
        Self {
            coordinator,
            monitor,
            notifier,
        }
    }

    fn runs(&self, workspace_id: &str) -> Vec<steward_core::run::RunRecord> {
        self.coordinator
            .list_runs(&RunFilter::new().with_workspace_id(workspace_id))
            .unwrap()
    }
}

fn scheduled(id: &str, interval_secs: u64) -> WorkspaceConfig {
    let mut ws = WorkspaceConfig::new(id);
    ws.schedule_interval_secs = interval_secs;
    ws
}

fn fast_ticks() -> MonitorConfig {
    MonitorConfig {
        tick_interval_ms: 100,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_workspace_runs_on_cadence() {
    let harness = TestHarness::new(
        &[scheduled("ws-sched", 10), WorkspaceConfig::new("ws-manual")],
        &[MockGroupAdapter::new("catalog")],
        fast_ticks(),
    );

    harness.monitor.start();
    // Due at start, then at 10s and 20s.
    tokio::time::sleep(Duration::from_millis(25_000)).await;
    harness.monitor.stop().await;

    let runs = harness.runs("ws-sched");
    assert_eq!(runs.len(), 3);
    assert!(runs.iter().all(|r| r.context.trigger == RunTrigger::Scheduled));
    assert!(runs.iter().all(|r| r.status == Some(TerminalStatus::Committed)));
    assert!(harness.runs("ws-manual").is_empty());

    let status = harness.monitor.status();
    assert!(!status.running);
    assert_eq!(status.scheduled_workspaces, 1);
    assert_eq!(status.runs_observed, 3);
    assert_eq!(status.windows[0].workspace_id, "ws-sched");
    assert_eq!(status.windows[0].samples, 3);
}

#[tokio::test(start_paused = true)]
async fn test_locked_workspace_is_retried_next_tick() {
    let slow = MockGroupAdapter::new("catalog").with_delay(Duration::from_secs(3));
    let harness = TestHarness::new(&[scheduled("ws-1", 1)], &[slow], fast_ticks());

    harness.monitor.start();
    // The first run holds the workspace for 3s; ticks in between hit the lock.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    let runs = harness.runs("ws-1");
    assert_eq!(runs.len(), 1);

    // The retry lands on the first tick after the lock is released.
    tokio::time::sleep(Duration::from_millis(800)).await;
    harness.monitor.stop().await;
    let runs = harness.runs("ws-1");
    assert_eq!(runs.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_manual_runs_feed_the_window_and_raise_alerts() {
    let failing = MockGroupAdapter::new("compliance").failing("policy store down");
    let harness = TestHarness::new(
        &[WorkspaceConfig::new("ws-1")],
        &[MockGroupAdapter::new("catalog"), failing],
        MonitorConfig {
            min_baseline_samples: 2,
            min_window_success_ratio: 0.9,
            ..fast_ticks()
        },
    );
    harness.monitor.start();
    // Let the outcome watcher subscribe.
    tokio::task::yield_now().await;

    for _ in 0..2 {
        harness
            .coordinator
            .start_run("ws-1", RunTrigger::Manual, "tester")
            .await
            .unwrap()
            .wait()
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    harness.monitor.stop().await;

    let alerts = harness.notifier.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::SuccessRatioBelowThreshold);
    assert_eq!(alerts[0].workspace_id, "ws-1");
    assert_eq!(harness.monitor.status().runs_observed, 2);
}

#[tokio::test]
async fn test_recovered_runs_feed_the_window() {
    let harness = TestHarness::new(
        &[WorkspaceConfig::new("ws-1")],
        &[MockGroupAdapter::new("catalog")],
        fast_ticks(),
    );

    let mut record = fixtures::run_record("run-crashed", "ws-1");
    record.state = RunState::Idle;
    record.status = Some(TerminalStatus::Errored);
    record.error = Some("interrupted by coordinator restart".to_string());
    record.finished_at = Some(chrono::Utc::now());

    let alerts = harness.monitor.record_runs(&[record]).await;

    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::RunErrored);
    assert_eq!(alerts[0].run_id, "run-crashed");
    assert_eq!(harness.notifier.alerts().await.len(), 1);
    assert_eq!(harness.monitor.status().runs_observed, 1);
}
