use async_trait::async_trait;
use tracing::{info, warn};

use super::{Alert, Notifier, NotifyError, RunOutcomeReport};

/// Notifier that writes outcomes and alerts to the tracing log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn report_run_outcome(&self, report: &RunOutcomeReport) -> Result<(), NotifyError> {
        info!(
            run_id = %report.run_id,
            workspace_id = %report.workspace_id,
            status = %report.status,
            verdict = report.decision.as_ref().map(|d| d.verdict.as_str()).unwrap_or("none"),
            compensations = report.compensation.len(),
            duration_ms = report.duration_ms.unwrap_or(0),
            "Run outcome"
        );
        Ok(())
    }

    async fn raise_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        warn!(
            kind = %alert.kind,
            workspace_id = %alert.workspace_id,
            run_id = %alert.run_id,
            "ALERT: {}",
            alert.message
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
