use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

/// The workspace already has a run in flight.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Run already in progress for workspace {workspace_id} (run {holder_run_id})")]
pub struct LockContentionError {
    pub workspace_id: String,
    pub holder_run_id: String,
}

/// Process-wide table of workspace locks. One holder per workspace; acquiring
/// never waits.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceLocks {
    held: Arc<Mutex<HashMap<String, String>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lock for `workspace_id` on behalf of `run_id`, or reports who holds it.
    pub fn try_acquire(
        &self,
        workspace_id: &str,
        run_id: &str,
    ) -> Result<WorkspaceLease, LockContentionError> {
        let mut held = self.held.lock().unwrap();
        if let Some(holder) = held.get(workspace_id) {
            return Err(LockContentionError {
                workspace_id: workspace_id.to_string(),
                holder_run_id: holder.clone(),
            });
        }
        held.insert(workspace_id.to_string(), run_id.to_string());
        debug!(workspace_id, run_id, "Workspace lock acquired");

        Ok(WorkspaceLease {
            locks: self.held.clone(),
            workspace_id: workspace_id.to_string(),
            run_id: run_id.to_string(),
        })
    }

    /// Run currently holding the workspace, if any.
    pub fn holder(&self, workspace_id: &str) -> Option<String> {
        self.held.lock().unwrap().get(workspace_id).cloned()
    }

    pub fn is_locked(&self, workspace_id: &str) -> bool {
        self.held.lock().unwrap().contains_key(workspace_id)
    }

    /// Snapshot of (workspace id, run id) pairs.
    pub fn held(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .held
            .lock()
            .unwrap()
            .iter()
            .map(|(w, r)| (w.clone(), r.clone()))
            .collect();
        pairs.sort();
        pairs
    }
}

/// Held workspace lock. Released on drop.
#[derive(Debug)]
pub struct WorkspaceLease {
    locks: Arc<Mutex<HashMap<String, String>>>,
    workspace_id: String,
    run_id: String,
}

impl WorkspaceLease {
    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn release(self) {}
}

impl Drop for WorkspaceLease {
    fn drop(&mut self) {
        let mut held = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if held.get(&self.workspace_id) == Some(&self.run_id) {
            held.remove(&self.workspace_id);
            debug!(workspace_id = %self.workspace_id, run_id = %self.run_id, "Workspace lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_second_acquire_is_rejected_with_holder() {
        let locks = WorkspaceLocks::new();
        let _lease = locks.try_acquire("ws-a", "run-1").unwrap();

        let err = locks.try_acquire("ws-a", "run-2").unwrap_err();
        assert_eq!(err.workspace_id, "ws-a");
        assert_eq!(err.holder_run_id, "run-1");
        assert_eq!(locks.holder("ws-a").as_deref(), Some("run-1"));
    }

    #[test]
    fn test_different_workspaces_are_independent() {
        let locks = WorkspaceLocks::new();
        let _a = locks.try_acquire("ws-a", "run-1").unwrap();
        let _b = locks.try_acquire("ws-b", "run-2").unwrap();
        assert_eq!(locks.held().len(), 2);
    }

    #[test]
    fn test_drop_releases_lock() {
        let locks = WorkspaceLocks::new();
        let lease = locks.try_acquire("ws-a", "run-1").unwrap();
        assert!(locks.is_locked("ws-a"));
        lease.release();
        assert!(!locks.is_locked("ws-a"));
        assert_ok!(locks.try_acquire("ws-a", "run-2"));
    }

    #[test]
    fn test_clones_share_state() {
        let locks = WorkspaceLocks::new();
        let other = locks.clone();
        let _lease = locks.try_acquire("ws-a", "run-1").unwrap();
        assert_err!(other.try_acquire("ws-a", "run-2"));
    }
}
