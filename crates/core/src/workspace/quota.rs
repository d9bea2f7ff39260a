use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(3600);

/// Per-workspace resource limits, pinned into each run's context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    /// Runs admitted per rolling hour. `None` is unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs_per_hour: Option<u32>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error("Quota exhausted for workspace {workspace_id}: {limit} runs per hour")]
    Exhausted { workspace_id: String, limit: u32 },
}

/// Sliding one-hour admission window per workspace.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    admitted: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits one run against `quota`, or fails without recording anything.
    pub fn try_admit(&self, workspace_id: &str, quota: &ResourceQuota) -> Result<(), QuotaError> {
        let Some(limit) = quota.max_runs_per_hour else {
            return Ok(());
        };

        let now = Instant::now();
        let mut admitted = self.admitted.lock().unwrap();
        let window = admitted.entry(workspace_id.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= limit as usize {
            return Err(QuotaError::Exhausted {
                workspace_id: workspace_id.to_string(),
                limit,
            });
        }
        window.push_back(now);
        Ok(())
    }

    /// Runs admitted in the current window.
    pub fn used(&self, workspace_id: &str) -> usize {
        let now = Instant::now();
        self.admitted
            .lock()
            .unwrap()
            .get(workspace_id)
            .map(|w| w.iter().filter(|t| now.duration_since(**t) < WINDOW).count())
            .unwrap_or(0)
    }
}
