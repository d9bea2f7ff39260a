use thiserror::Error;

/// A deadline elapsed before a group answered.
///
/// Recorded as `TaskState::TimedOut` and counted as a failure by the gate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("Group {group_id} exceeded its task timeout of {timeout_ms}ms")]
    Task { group_id: String, timeout_ms: u64 },

    #[error("Run deadline elapsed before group {group_id} finished")]
    RunDeadline { group_id: String },

    #[error("Run cancelled while group {group_id} was running")]
    Cancelled { group_id: String },

    #[error("Undo for group {group_id} exceeded {timeout_ms}ms")]
    Compensation { group_id: String, timeout_ms: u64 },
}
