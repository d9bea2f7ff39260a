//! Types for the orchestration coordinator.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::activity::RecordError;
use crate::persistence::PersistenceError;
use crate::run::RunRecord;
use crate::workspace::{LockContentionError, QuotaError};

/// Errors surfaced by the coordinator to its callers.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Unknown workspace: {0}")]
    UnknownWorkspace(String),

    #[error("Workspace {workspace_id} references unknown group {group_id}")]
    UnknownGroup {
        workspace_id: String,
        group_id: String,
    },

    /// The workspace already has a run in flight. No run was created.
    #[error(transparent)]
    LockContention(#[from] LockContentionError),

    /// The run was created and ended `Errored` at initialization.
    #[error("Run {run_id} rejected: {source}")]
    QuotaExhausted {
        run_id: String,
        #[source]
        source: QuotaError,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {0} has already finished")]
    RunAlreadyFinished(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Activity error: {0}")]
    Activity(#[from] RecordError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Handle to a run driven in the background.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: String,
    pub workspace_id: String,
    pub(crate) handle: JoinHandle<RunRecord>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Waits for the run to reach its terminal state.
    pub async fn wait(self) -> Result<RunRecord, CoordinatorError> {
        self.handle
            .await
            .map_err(|e| CoordinatorError::Internal(format!("run task failed: {}", e)))
    }
}

/// A run currently holding its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightRun {
    pub workspace_id: String,
    pub run_id: String,
}

/// Current status of the coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    /// Configured workspace ids.
    pub workspaces: Vec<String>,
    /// Registered group ids.
    pub groups: Vec<String>,
    pub in_flight: Vec<InFlightRun>,
}
