use chrono::{DateTime, Utc};

use super::{RunRecord, RunState, TerminalStatus};
use crate::persistence::PersistenceError;

/// Filter for querying run records
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub workspace_id: Option<String>,
    pub state: Option<RunState>,
    pub status: Option<TerminalStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl RunFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_status(mut self, status: TerminalStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Durable storage for run snapshots.
///
/// A record is written when the run is created and rewritten on every state
/// transition, so a crash leaves at most one transition unpersisted.
pub trait RunStore: Send + Sync {
    /// Insert a new run. Fails if the id already exists.
    fn insert(&self, record: &RunRecord) -> Result<(), PersistenceError>;

    /// Replace the stored snapshot of an existing run.
    fn update(&self, record: &RunRecord) -> Result<(), PersistenceError>;

    fn get(&self, run_id: &str) -> Result<Option<RunRecord>, PersistenceError>;

    /// Newest first.
    fn list(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, PersistenceError>;

    fn count(&self, filter: &RunFilter) -> Result<i64, PersistenceError>;

    /// Runs without a terminal outcome: not back to idle, or never given a status.
    /// Used for restart recovery.
    fn list_active(&self) -> Result<Vec<RunRecord>, PersistenceError>;
}
