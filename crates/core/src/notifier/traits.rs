use async_trait::async_trait;
use thiserror::Error;

use super::types::{Alert, RunOutcomeReport};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Notifier rejected the message with HTTP {0}")]
    Rejected(u16),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Outbound channel for run outcomes and alerts.
///
/// Failures are logged by callers and never affect the run.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called exactly once per terminal run.
    async fn report_run_outcome(&self, report: &RunOutcomeReport) -> Result<(), NotifyError>;

    async fn raise_alert(&self, alert: &Alert) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}
