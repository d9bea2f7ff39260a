//! In-process stand-in for a governance domain.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{AdapterError, ExecutionContext, GroupAdapter, GroupDescriptor, UndoOutcome};
use crate::config::GroupConfig;

/// Stub adapter with configurable latency and failure.
///
/// Returns a receipt derived from the run, group and input so that the same
/// call always produces the same result. Undo keeps no state: its outcome
/// depends only on whether the group supports undo, so repeating it for the
/// same result always answers the same.
pub struct StubAdapter {
    descriptor: GroupDescriptor,
    latency: Duration,
    fail: bool,
}

impl StubAdapter {
    pub fn new(descriptor: GroupDescriptor) -> Self {
        Self {
            descriptor,
            latency: Duration::ZERO,
            fail: false,
        }
    }

    pub fn from_config(config: &GroupConfig) -> Self {
        Self::new(config.descriptor())
            .with_latency(Duration::from_millis(config.latency_ms))
            .with_failure(config.fail)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }

    fn receipt(ctx: &ExecutionContext, input: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(ctx.run_id.as_bytes());
        hasher.update(ctx.group_id.as_bytes());
        hasher.update(input.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[async_trait]
impl GroupAdapter for StubAdapter {
    fn describe(&self) -> GroupDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, ctx: &ExecutionContext, input: &Value) -> Result<Value, AdapterError> {
        if !self.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.latency) => {}
                _ = ctx.cancel.cancelled() => {
                    return Err(AdapterError::Cancelled(ctx.group_id.clone()));
                }
            }
        }

        if self.fail {
            return Err(AdapterError::failed(
                &ctx.group_id,
                "stub configured to fail",
            ));
        }

        debug!(run_id = %ctx.run_id, group = %ctx.group_id, "Stub group executed");
        Ok(json!({
            "group_id": ctx.group_id,
            "run_id": ctx.run_id,
            "receipt": Self::receipt(ctx, input),
        }))
    }

    async fn undo(
        &self,
        ctx: &ExecutionContext,
        result: &Value,
    ) -> Result<UndoOutcome, AdapterError> {
        let outcome = if self.descriptor.undo_supported {
            UndoOutcome::Reversed
        } else {
            UndoOutcome::Irreversible
        };
        debug!(
            run_id = %ctx.run_id,
            group = %ctx.group_id,
            receipt = result.get("receipt").and_then(serde_json::Value::as_str),
            ?outcome,
            "Stub group undo"
        );
        Ok(outcome)
    }
}
