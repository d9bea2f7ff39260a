use chrono::{DateTime, Utc};

use super::ActivityEntry;
use crate::persistence::PersistenceError;
use crate::run::RunState;

/// Filter for querying activity entries
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub run_id: Option<String>,
    pub workspace_id: Option<String>,
    pub from_state: Option<RunState>,
    pub to_state: Option<RunState>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    pub fn with_from_state(mut self, state: RunState) -> Self {
        self.from_state = Some(state);
        self
    }

    pub fn with_to_state(mut self, state: RunState) -> Self {
        self.to_state = Some(state);
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

/// Append-only storage for activity entries. There is no update or delete.
pub trait ActivityLog: Send + Sync {
    /// Append an entry, returns the assigned ID
    fn append(&self, entry: &ActivityEntry) -> Result<i64, PersistenceError>;

    /// Entries in insertion order.
    fn query(&self, filter: &ActivityFilter) -> Result<Vec<ActivityEntry>, PersistenceError>;

    fn count(&self, filter: &ActivityFilter) -> Result<i64, PersistenceError>;

    /// Most recent entry for a run.
    fn last_for_run(&self, run_id: &str) -> Result<Option<ActivityEntry>, PersistenceError>;
}
