use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::{RollingWindow, RunSample, WindowSummary};
use crate::config::MonitorConfig;
use crate::metrics;
use crate::notifier::{Alert, AlertKind, Notifier, RunOutcomeReport};
use crate::run::TerminalStatus;

/// Feeds finished runs into per-workspace windows and raises alerts.
pub struct RunObserver {
    config: MonitorConfig,
    notifier: Arc<dyn Notifier>,
    windows: Mutex<HashMap<String, RollingWindow>>,
    runs_observed: AtomicU64,
    alerts_raised: AtomicU64,
}

impl RunObserver {
    pub fn new(config: MonitorConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            notifier,
            windows: Mutex::new(HashMap::new()),
            runs_observed: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
        }
    }

    /// Records one finished run and delivers any alert it triggers.
    pub async fn record_run(&self, report: &RunOutcomeReport) -> Vec<Alert> {
        let alerts = self.evaluate(report);
        for alert in &alerts {
            metrics::ALERTS.with_label_values(&[alert.kind.as_str()]).inc();
            warn!(
                kind = %alert.kind,
                workspace_id = %alert.workspace_id,
                run_id = %alert.run_id,
                "{}",
                alert.message
            );
            if let Err(e) = self.notifier.raise_alert(alert).await {
                warn!(notifier = self.notifier.name(), error = %e, "Failed to deliver alert");
            }
        }
        self.alerts_raised
            .fetch_add(alerts.len() as u64, Ordering::Relaxed);
        alerts
    }

    /// Updates the workspace window and returns the alerts for this run.
    fn evaluate(&self, report: &RunOutcomeReport) -> Vec<Alert> {
        self.runs_observed.fetch_add(1, Ordering::Relaxed);
        let mut alerts = Vec::new();
        let alert = |kind, message: String| {
            Alert::new(kind, &report.workspace_id, &report.run_id, message)
        };

        if report.status == TerminalStatus::Errored {
            alerts.push(alert(
                AlertKind::RunErrored,
                format!(
                    "Run errored: {}",
                    report.error.as_deref().unwrap_or("unknown error")
                ),
            ));
        }

        let Some(sample) = RunSample::from_report(report) else {
            return alerts;
        };

        let mut windows = self.windows.lock().unwrap();
        let window = windows
            .entry(report.workspace_id.clone())
            .or_insert_with(|| RollingWindow::new(self.config.window_size));

        // Baseline comes from earlier runs only.
        if window.len() >= self.config.min_baseline_samples {
            if let Some(p95) = window.p95_duration_ms() {
                let limit = p95 as f64 * self.config.duration_alert_factor;
                if sample.duration_ms as f64 > limit {
                    alerts.push(alert(
                        AlertKind::DurationAboveBaseline,
                        format!(
                            "Run took {}ms, above {:.0}ms (p95 {}ms x {})",
                            sample.duration_ms, limit, p95, self.config.duration_alert_factor
                        ),
                    ));
                }
            }
        }

        window.push(sample);

        if window.len() >= self.config.min_baseline_samples {
            if let Some(mean) = window.mean_success_ratio() {
                let below = mean < self.config.min_window_success_ratio;
                if below && !window.ratio_alerting {
                    alerts.push(alert(
                        AlertKind::SuccessRatioBelowThreshold,
                        format!(
                            "Rolling success ratio {:.3} below {:.3} over {} runs",
                            mean,
                            self.config.min_window_success_ratio,
                            window.len()
                        ),
                    ));
                }
                window.ratio_alerting = below;
            }
        }

        debug!(
            workspace_id = %report.workspace_id,
            samples = window.len(),
            alerts = alerts.len(),
            "Run observed"
        );
        alerts
    }

    pub fn runs_observed(&self) -> u64 {
        self.runs_observed.load(Ordering::Relaxed)
    }

    pub fn alerts_raised(&self) -> u64 {
        self.alerts_raised.load(Ordering::Relaxed)
    }

    /// Window statistics in workspace id order.
    pub fn summaries(&self) -> Vec<WindowSummary> {
        let windows = self.windows.lock().unwrap();
        let mut summaries: Vec<WindowSummary> = windows
            .iter()
            .map(|(workspace_id, window)| WindowSummary {
                workspace_id: workspace_id.clone(),
                samples: window.len(),
                mean_success_ratio: window.mean_success_ratio(),
                p95_duration_ms: window.p95_duration_ms(),
                group_p95_ms: window.group_p95_ms(),
            })
            .collect();
        summaries.sort_by(|a, b| a.workspace_id.cmp(&b.workspace_id));
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GroupDescriptor;
    use crate::run::{GroupTask, JoinResult};
    use crate::testing::RecordingNotifier;
    use serde_json::json;

    fn config() -> MonitorConfig {
        MonitorConfig {
            window_size: 10,
            min_window_success_ratio: 0.9,
            duration_alert_factor: 2.0,
            min_baseline_samples: 3,
            ..Default::default()
        }
    }

    fn report(run_id: &str, duration_ms: u64, succeeded: usize, failed: usize) -> RunOutcomeReport {
        let mut tasks = Vec::new();
        for i in 0..succeeded + failed {
            let mut task = GroupTask::new(run_id, &GroupDescriptor::new(format!("g{}", i)), json!({}));
            task.mark_running();
            if i < succeeded {
                task.succeed(json!({}));
            } else {
                task.fail("boom");
            }
            tasks.push(task);
        }
        let status = if failed == 0 {
            TerminalStatus::Committed
        } else {
            TerminalStatus::Compensated
        };
        RunOutcomeReport {
            run_id: run_id.to_string(),
            workspace_id: "ws-1".to_string(),
            status,
            decision: None,
            join: Some(JoinResult::from_tasks(tasks, false, false)),
            compensation: vec![],
            error: None,
            duration_ms: Some(duration_ms),
        }
    }

    fn observer() -> (RunObserver, RecordingNotifier) {
        let notifier = RecordingNotifier::new();
        (RunObserver::new(config(), Arc::new(notifier.clone())), notifier)
    }

    #[tokio::test]
    async fn test_errored_run_raises_alert() {
        let (observer, notifier) = observer();
        let errored = RunOutcomeReport {
            status: TerminalStatus::Errored,
            join: None,
            error: Some("disk full".to_string()),
            ..report("run-1", 10, 1, 0)
        };

        let alerts = observer.record_run(&errored).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::RunErrored);
        assert!(alerts[0].message.contains("disk full"));
        assert_eq!(notifier.alerts().await.len(), 1);
        // No join, no sample.
        assert!(observer.summaries().is_empty());
    }

    #[tokio::test]
    async fn test_duration_alert_needs_baseline() {
        let (observer, _) = observer();

        // Too few samples for a baseline.
        assert!(observer.record_run(&report("r1", 100, 1, 0)).await.is_empty());
        assert!(observer.record_run(&report("r2", 1_000, 1, 0)).await.is_empty());
        assert!(observer.record_run(&report("r3", 100, 1, 0)).await.is_empty());

        // p95 of [100, 1000, 100] is 1000, limit 2000.
        assert!(observer.record_run(&report("r4", 2_000, 1, 0)).await.is_empty());

        let alerts = observer.record_run(&report("r5", 4_500, 1, 0)).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::DurationAboveBaseline);
        assert_eq!(alerts[0].run_id, "r5");
    }

    #[tokio::test]
    async fn test_ratio_alert_fires_once_per_dip() {
        let (observer, notifier) = observer();

        observer.record_run(&report("r1", 10, 1, 1)).await;
        observer.record_run(&report("r2", 10, 1, 1)).await;
        let alerts = observer.record_run(&report("r3", 10, 1, 1)).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SuccessRatioBelowThreshold);

        // Still below: no repeat.
        assert!(observer.record_run(&report("r4", 10, 1, 1)).await.is_empty());
        assert_eq!(notifier.alerts().await.len(), 1);
        assert_eq!(observer.alerts_raised(), 1);
        assert_eq!(observer.runs_observed(), 4);

        let summary = &observer.summaries()[0];
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.mean_success_ratio, Some(0.5));
    }
}
