use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::run::{CompensationRecord, GateDecision, JoinResult, RunRecord, TerminalStatus};

/// Everything an external observer learns about a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcomeReport {
    pub run_id: String,
    pub workspace_id: String,
    pub status: TerminalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GateDecision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinResult>,
    #[serde(default)]
    pub compensation: Vec<CompensationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl From<&RunRecord> for RunOutcomeReport {
    fn from(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id().to_string(),
            workspace_id: record.workspace_id().to_string(),
            status: record.status.unwrap_or(TerminalStatus::Errored),
            decision: record.decision.clone(),
            join: record.join.clone(),
            compensation: record.compensation.clone(),
            error: record.error.clone(),
            duration_ms: record.duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    RunErrored,
    SuccessRatioBelowThreshold,
    DurationAboveBaseline,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::RunErrored => "run_errored",
            AlertKind::SuccessRatioBelowThreshold => "success_ratio_below_threshold",
            AlertKind::DurationAboveBaseline => "duration_above_baseline",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised by the monitoring loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub workspace_id: String,
    pub run_id: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        workspace_id: impl Into<String>,
        run_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            workspace_id: workspace_id.into(),
            run_id: run_id.into(),
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}
