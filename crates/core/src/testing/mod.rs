//! Testing utilities and mock implementations for integration tests.
//!
//! This module provides mocks for the two outward-facing traits, the group
//! adapter and the notifier, so whole runs can be driven without any real
//! domain service.
//!
//! # Example
//!
//! ```rust,ignore
//! use steward_core::testing::{MockGroupAdapter, RecordingNotifier};
//!
//! let compliance = MockGroupAdapter::new("compliance").required(true);
//! let scanning = MockGroupAdapter::new("scanning").with_delay(Duration::from_secs(10));
//! let notifier = RecordingNotifier::new();
//!
//! // Register the adapters, build a Coordinator with_notifier(...), run...
//! assert_eq!(notifier.reports().await.len(), 1);
//! ```

mod mock_group_adapter;
mod recording_notifier;

pub use mock_group_adapter::{MockGroupAdapter, RecordedExecution, RecordedUndo};
pub use recording_notifier::RecordingNotifier;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use serde_json::json;

    use crate::adapter::GroupDescriptor;
    use crate::run::{RunConfigSnapshot, RunContext, RunRecord, RunTrigger};
    use crate::workspace::ResourceQuota;

    /// Create a run context over `groups` with generous timeouts and the
    /// default all-must-succeed gate.
    pub fn run_context(run_id: &str, workspace_id: &str, groups: &[&str]) -> RunContext {
        RunContext {
            run_id: run_id.to_string(),
            workspace_id: workspace_id.to_string(),
            requested_at: Utc::now(),
            requested_by: "test".to_string(),
            trigger: RunTrigger::Manual,
            config: RunConfigSnapshot {
                groups: groups.iter().map(|id| GroupDescriptor::new(*id)).collect(),
                min_success_ratio: 1.0,
                run_timeout_ms: 5_000,
                task_timeout_ms: 5_000,
                compensation_timeout_ms: 60_000,
                input: json!({ "workspace": workspace_id }),
            },
            config_hash: "test".to_string(),
            quota: ResourceQuota::default(),
        }
    }

    /// Create an idle run record over a single `catalog` group.
    pub fn run_record(run_id: &str, workspace_id: &str) -> RunRecord {
        RunRecord::new(run_context(run_id, workspace_id, &["catalog"]))
    }
}
