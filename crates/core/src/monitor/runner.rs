//! The long-lived monitoring loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{RunObserver, WindowSummary};
use crate::config::MonitorConfig;
use crate::coordinator::{Coordinator, CoordinatorError};
use crate::notifier::{Alert, Notifier, RunOutcomeReport};
use crate::run::{RunRecord, RunTrigger};

const REQUESTED_BY: &str = "monitor";

/// Current status of the monitoring loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub scheduled_workspaces: usize,
    pub runs_observed: u64,
    pub alerts_raised: u64,
    pub windows: Vec<WindowSummary>,
}

/// Schedules runs for every workspace with an interval and watches every
/// finished run, manual or scheduled.
///
/// One instance per process, built by the composition root and driven with
/// [`start`](Self::start) / [`stop`](Self::stop).
pub struct MonitoringLoop {
    coordinator: Arc<Coordinator>,
    config: MonitorConfig,
    observer: Arc<RunObserver>,
    /// Next start time per scheduled workspace.
    next_due: Arc<Mutex<HashMap<String, Instant>>>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MonitoringLoop {
    pub fn new(
        coordinator: Arc<Coordinator>,
        notifier: Arc<dyn Notifier>,
        config: MonitorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            coordinator,
            observer: Arc::new(RunObserver::new(config.clone(), notifier)),
            config,
            next_due: Arc::new(Mutex::new(HashMap::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    /// Start the tick loop and the outcome watcher.
    ///
    /// Every scheduled workspace is due immediately.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Monitoring loop already running");
            return;
        }

        let scheduled = self.coordinator.scheduled_workspaces();
        info!(
            scheduled = scheduled.len(),
            tick_ms = self.config.tick_interval_ms,
            "Starting monitoring loop"
        );
        {
            let now = Instant::now();
            let mut due = self.next_due.lock().unwrap();
            due.clear();
            for (workspace_id, _) in &scheduled {
                due.insert(workspace_id.clone(), now);
            }
        }

        self.spawn_outcome_watcher();
        self.spawn_tick_loop(scheduled);
    }

    /// Stop both loops. Runs already started finish on their own.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping monitoring loop");
        let _ = self.shutdown_tx.send(());
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Feeds a finished run into the rolling windows. The outcome watcher
    /// calls this for every run the coordinator finalizes.
    pub async fn record_run(&self, report: &RunOutcomeReport) -> Vec<Alert> {
        self.observer.record_run(report).await
    }

    /// Feeds runs that finished outside the outcome watcher, such as the
    /// runs closed out by [`Coordinator::recover`].
    pub async fn record_runs(&self, records: &[RunRecord]) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for record in records {
            alerts.extend(self.record_run(&RunOutcomeReport::from(record)).await);
        }
        alerts
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            running: self.is_running(),
            scheduled_workspaces: self.coordinator.scheduled_workspaces().len(),
            runs_observed: self.observer.runs_observed(),
            alerts_raised: self.observer.alerts_raised(),
            windows: self.observer.summaries(),
        }
    }

    fn spawn_tick_loop(&self, scheduled: Vec<(String, Duration)>) {
        let running = Arc::clone(&self.running);
        let coordinator = Arc::clone(&self.coordinator);
        let next_due = Arc::clone(&self.next_due);
        let tick = Duration::from_millis(self.config.tick_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Schedule loop started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                Self::start_due_runs(&coordinator, &next_due, &scheduled).await;

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Schedule loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(tick) => {}
                }
            }
            info!("Schedule loop stopped");
        });
    }

    fn spawn_outcome_watcher(&self) {
        let observer = Arc::clone(&self.observer);
        let mut outcomes = self.coordinator.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("Outcome watcher started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Outcome watcher received shutdown signal");
                        break;
                    }
                    outcome = outcomes.recv() => match outcome {
                        Ok(record) => {
                            observer.record_run(&RunOutcomeReport::from(&record)).await;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Outcome watcher lagged, runs not observed");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            info!("Outcome watcher stopped");
        });
    }

    /// Starts a run for every workspace whose time has come. A locked
    /// workspace stays due and is retried on the next tick.
    async fn start_due_runs(
        coordinator: &Arc<Coordinator>,
        next_due: &Mutex<HashMap<String, Instant>>,
        scheduled: &[(String, Duration)],
    ) {
        let now = Instant::now();
        for (workspace_id, interval) in scheduled {
            let due = next_due
                .lock()
                .unwrap()
                .get(workspace_id)
                .copied()
                .unwrap_or(now);
            if due > now {
                continue;
            }

            let next = match coordinator
                .start_run(workspace_id, RunTrigger::Scheduled, REQUESTED_BY)
                .await
            {
                Ok(handle) => {
                    debug!(workspace_id = %workspace_id, run_id = %handle.run_id(), "Scheduled run started");
                    Some(now + *interval)
                }
                Err(CoordinatorError::LockContention(e)) => {
                    debug!(
                        workspace_id = %workspace_id,
                        holder = %e.holder_run_id,
                        "Workspace busy, retrying next tick"
                    );
                    None
                }
                Err(e) => {
                    error!(workspace_id = %workspace_id, error = %e, "Scheduled run failed to start");
                    Some(now + *interval)
                }
            };

            if let Some(next) = next {
                next_due.lock().unwrap().insert(workspace_id.clone(), next);
            }
        }
    }
}
