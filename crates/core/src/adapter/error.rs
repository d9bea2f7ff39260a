//! Error types for group adapters.

use thiserror::Error;

/// A group's `execute` or `undo` failed.
///
/// Always local to one task: the scheduler converts it to `TaskState::Failed`
/// and the compensation manager to `CompensationOutcome::Failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Group {group_id} failed: {message}")]
    Failed { group_id: String, message: String },

    #[error("Group {group_id} unavailable: {message}")]
    Unavailable { group_id: String, message: String },

    #[error("Invalid response from group {group_id}: {message}")]
    InvalidResponse { group_id: String, message: String },

    #[error("Group {0} call cancelled")]
    Cancelled(String),

    #[error("Group {group_id} panicked: {message}")]
    Panicked { group_id: String, message: String },
}

impl AdapterError {
    pub fn failed(group_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            group_id: group_id.into(),
            message: message.into(),
        }
    }

    /// Builds a `Panicked` error from a `catch_unwind` payload.
    pub fn from_panic(group_id: impl Into<String>, payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked {
            group_id: group_id.into(),
            message,
        }
    }
}

/// Errors raised while building an [`AdapterRegistry`](super::AdapterRegistry).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Group {0} registered twice")]
    Duplicate(String),

    #[error("Invalid adapter configuration for group {group_id}: {message}")]
    InvalidConfig { group_id: String, message: String },
}
