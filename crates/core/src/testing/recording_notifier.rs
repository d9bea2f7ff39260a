//! Notifier that keeps everything it is given.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notifier::{Alert, Notifier, NotifyError, RunOutcomeReport};

/// Mock implementation of the Notifier trait.
///
/// Records every run outcome and alert, and can be told to fail delivery.
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    reports: Arc<RwLock<Vec<RunOutcomeReport>>>,
    alerts: Arc<RwLock<Vec<Alert>>>,
    fail_with: Arc<RwLock<Option<String>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (after recording it).
    pub async fn set_failure(&self, message: Option<String>) {
        *self.fail_with.write().await = message;
    }

    pub async fn reports(&self) -> Vec<RunOutcomeReport> {
        self.reports.read().await.clone()
    }

    /// Reports delivered for one run.
    pub async fn reports_for(&self, run_id: &str) -> Vec<RunOutcomeReport> {
        self.reports
            .read()
            .await
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    async fn outcome(&self) -> Result<(), NotifyError> {
        match self.fail_with.read().await.as_ref() {
            Some(message) => Err(NotifyError::Delivery(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn report_run_outcome(&self, report: &RunOutcomeReport) -> Result<(), NotifyError> {
        self.reports.write().await.push(report.clone());
        self.outcome().await
    }

    async fn raise_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.write().await.push(alert.clone());
        self.outcome().await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
