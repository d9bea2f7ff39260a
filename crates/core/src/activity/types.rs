use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::run::RunState;

/// One coordinator-level state transition. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Assigned by the store; 0 before insertion.
    pub id: i64,
    pub run_id: String,
    pub workspace_id: String,
    /// Position within the run, starting at 1.
    pub seq: u32,
    pub timestamp: DateTime<Utc>,
    pub from_state: RunState,
    pub to_state: RunState,
    #[serde(default)]
    pub detail: Value,
}
