//! Writes activity entries at coordinator-level transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{ActivityEntry, ActivityLog};
use crate::persistence::PersistenceError;
use crate::run::RunState;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Invalid transition for run {run_id}: {from} -> {to} (run is {current})")]
    InvalidTransition {
        run_id: String,
        current: RunState,
        from: RunState,
        to: RunState,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[derive(Debug, Clone)]
struct Cursor {
    state: RunState,
    seq: u32,
    last: DateTime<Utc>,
}

/// Guards the activity trail of every run.
///
/// Each entry must start where the previous one ended and follow a legal run
/// transition. Timestamps per run are strictly increasing. A failed write
/// leaves the run's cursor untouched.
pub struct ActivityRecorder {
    log: Arc<dyn ActivityLog>,
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl ActivityRecorder {
    pub fn new(log: Arc<dyn ActivityLog>) -> Self {
        Self {
            log,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn log(&self) -> &Arc<dyn ActivityLog> {
        &self.log
    }

    /// Appends the transition `from -> to` for `run_id`.
    pub fn record(
        &self,
        run_id: &str,
        workspace_id: &str,
        from: RunState,
        to: RunState,
        detail: Value,
    ) -> Result<ActivityEntry, RecordError> {
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.get(run_id).cloned();
        let current = cursor.as_ref().map(|c| c.state).unwrap_or(RunState::Idle);

        if current != from || !from.can_transition_to(to) {
            return Err(RecordError::InvalidTransition {
                run_id: run_id.to_string(),
                current,
                from,
                to,
            });
        }

        let now = Utc::now();
        let timestamp = match &cursor {
            Some(c) if now <= c.last => c.last + Duration::microseconds(1),
            _ => now,
        };
        let seq = cursor.as_ref().map(|c| c.seq).unwrap_or(0) + 1;

        let mut entry = ActivityEntry {
            id: 0,
            run_id: run_id.to_string(),
            workspace_id: workspace_id.to_string(),
            seq,
            timestamp,
            from_state: from,
            to_state: to,
            detail,
        };
        entry.id = self.log.append(&entry)?;
        debug!(run_id, %from, %to, seq, "Activity recorded");

        if to == RunState::Idle {
            cursors.remove(run_id);
        } else {
            cursors.insert(
                run_id.to_string(),
                Cursor {
                    state: to,
                    seq,
                    last: timestamp,
                },
            );
        }
        Ok(entry)
    }

    /// Re-attaches a run whose trail was written by an earlier process, using
    /// its last persisted entry. Returns the state the trail ended in.
    pub fn resume(&self, run_id: &str) -> Result<RunState, RecordError> {
        let Some(last) = self.log.last_for_run(run_id)? else {
            return Ok(RunState::Idle);
        };
        if last.to_state != RunState::Idle {
            self.cursors.lock().unwrap().insert(
                run_id.to_string(),
                Cursor {
                    state: last.to_state,
                    seq: last.seq,
                    last: last.timestamp,
                },
            );
        }
        Ok(last.to_state)
    }

    /// State the recorder believes the run is in.
    pub fn current_state(&self, run_id: &str) -> RunState {
        self.cursors
            .lock()
            .unwrap()
            .get(run_id)
            .map(|c| c.state)
            .unwrap_or(RunState::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityFilter, SqliteActivityLog};
    use serde_json::json;

    fn recorder() -> ActivityRecorder {
        ActivityRecorder::new(Arc::new(SqliteActivityLog::in_memory().unwrap()))
    }

    #[test]
    fn test_full_commit_trail() {
        let recorder = recorder();
        let path = [
            RunState::Idle,
            RunState::Initializing,
            RunState::Coordinating,
            RunState::Evaluating,
            RunState::Committing,
            RunState::Idle,
        ];
        for pair in path.windows(2) {
            recorder
                .record("run-1", "ws-a", pair[0], pair[1], json!({}))
                .unwrap();
        }

        let entries = recorder
            .log()
            .query(&ActivityFilter::new().with_run_id("run-1"))
            .unwrap();
        assert_eq!(entries.len(), 5);
        for (i, pair) in entries.windows(2).enumerate() {
            assert!(pair[0].timestamp < pair[1].timestamp, "entry {}", i);
            assert_eq!(pair[0].to_state, pair[1].from_state);
            assert_eq!(pair[1].seq, pair[0].seq + 1);
        }
        assert_eq!(recorder.current_state("run-1"), RunState::Idle);
    }

    #[test]
    fn test_rejects_transition_not_starting_at_current_state() {
        let recorder = recorder();
        recorder
            .record("run-1", "ws-a", RunState::Idle, RunState::Initializing, json!({}))
            .unwrap();

        let err = recorder
            .record("run-1", "ws-a", RunState::Coordinating, RunState::Evaluating, json!({}))
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::InvalidTransition {
                current: RunState::Initializing,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_illegal_transition() {
        let recorder = recorder();
        let err = recorder
            .record("run-1", "ws-a", RunState::Idle, RunState::Committing, json!({}))
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidTransition { .. }));
        assert_eq!(recorder.log().count(&ActivityFilter::new()).unwrap(), 0);
    }

    #[test]
    fn test_runs_are_tracked_independently() {
        let recorder = recorder();
        recorder
            .record("run-1", "ws-a", RunState::Idle, RunState::Initializing, json!({}))
            .unwrap();
        recorder
            .record("run-2", "ws-b", RunState::Idle, RunState::Initializing, json!({}))
            .unwrap();
        recorder
            .record("run-1", "ws-a", RunState::Initializing, RunState::Errored, json!({}))
            .unwrap();
        assert_eq!(recorder.current_state("run-1"), RunState::Errored);
        assert_eq!(recorder.current_state("run-2"), RunState::Initializing);
    }

    #[test]
    fn test_resume_continues_sequence() {
        let log: Arc<dyn ActivityLog> = Arc::new(SqliteActivityLog::in_memory().unwrap());
        let first = ActivityRecorder::new(log.clone());
        first
            .record("run-1", "ws-a", RunState::Idle, RunState::Initializing, json!({}))
            .unwrap();
        first
            .record("run-1", "ws-a", RunState::Initializing, RunState::Coordinating, json!({}))
            .unwrap();

        let second = ActivityRecorder::new(log);
        assert_eq!(second.resume("run-1").unwrap(), RunState::Coordinating);
        let entry = second
            .record("run-1", "ws-a", RunState::Coordinating, RunState::Errored, json!({}))
            .unwrap();
        assert_eq!(entry.seq, 3);
    }
}
