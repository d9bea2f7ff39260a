//! Types exchanged across the group adapter boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::run::CancelSignal;

/// Static capability metadata for one group. Read once when the registry is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub group_id: String,
    /// A run cannot commit unless this group succeeded.
    #[serde(default)]
    pub required: bool,
    /// False means every compensation for this group is recorded as irreversible
    /// without calling `undo`.
    #[serde(default = "default_true")]
    pub undo_supported: bool,
}

fn default_true() -> bool {
    true
}

impl GroupDescriptor {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            required: false,
            undo_supported: true,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn undo_supported(mut self, supported: bool) -> Self {
        self.undo_supported = supported;
        self
    }
}

/// Result of a successful `undo` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndoOutcome {
    Reversed,
    /// A valid answer, not an error: the work cannot be taken back.
    Irreversible,
}

/// Everything an adapter call needs to know about where it runs.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: String,
    pub workspace_id: String,
    pub group_id: String,
    /// Fires when the run is cancelled. Adapters doing long work should select on it.
    pub cancel: CancelSignal,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<String>,
        workspace_id: impl Into<String>,
        group_id: impl Into<String>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            workspace_id: workspace_id.into(),
            group_id: group_id.into(),
            cancel,
        }
    }
}

/// Wire body for the HTTP adapter's `undo` endpoint, also used by tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoResponse {
    pub outcome: UndoOutcome,
}

/// Wire body for the HTTP adapter's `execute` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub run_id: String,
    pub workspace_id: String,
    pub group_id: String,
    pub input: Value,
}

/// Wire body for the HTTP adapter's `undo` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoRequest {
    pub run_id: String,
    pub workspace_id: String,
    pub group_id: String,
    pub result: Value,
}
