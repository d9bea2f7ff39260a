//! The group adapter contract.

use async_trait::async_trait;
use serde_json::Value;

use super::error::AdapterError;
use super::types::{ExecutionContext, GroupDescriptor, UndoOutcome};

/// One governance domain as seen by the coordinator.
///
/// The coordinator calls `execute` at most once per (run, group). `undo` must
/// be idempotent: repeated calls with the same run id and result return the same
/// outcome.
#[async_trait]
pub trait GroupAdapter: Send + Sync {
    /// Static capability metadata.
    fn describe(&self) -> GroupDescriptor;

    /// Performs one unit of work. Should return promptly once `ctx.cancel` fires.
    async fn execute(&self, ctx: &ExecutionContext, input: &Value) -> Result<Value, AdapterError>;

    /// Reverses the work that produced `result`.
    async fn undo(
        &self,
        ctx: &ExecutionContext,
        result: &Value,
    ) -> Result<UndoOutcome, AdapterError>;
}
