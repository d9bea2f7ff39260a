//! Compensation manager: best-effort undo of groups that succeeded in a run
//! the gate rejected.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tracing::{info, warn};

use crate::adapter::{AdapterError, AdapterRegistry, ExecutionContext, UndoOutcome};
use crate::metrics;
use crate::run::{
    CancelSignal, CompensationOutcome, CompensationRecord, GroupTask, JoinResult, RunContext,
    TaskState, TerminalStatus,
};
use crate::scheduler::TimeoutError;

/// Outcome of compensating one run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationReport {
    /// One record per group that had succeeded, ordered by group id.
    pub records: Vec<CompensationRecord>,
}

impl CompensationReport {
    /// `Compensated` when every record reversed, `PartiallyCompensated` otherwise.
    pub fn status(&self) -> TerminalStatus {
        if self
            .records
            .iter()
            .all(|r| r.outcome == CompensationOutcome::Reversed)
        {
            TerminalStatus::Compensated
        } else {
            TerminalStatus::PartiallyCompensated
        }
    }

    /// Moves every reversed group's task to `Compensated`.
    pub fn apply_to(&self, tasks: &mut [GroupTask]) {
        for record in &self.records {
            if record.outcome != CompensationOutcome::Reversed {
                continue;
            }
            if let Some(task) = tasks.iter_mut().find(|t| t.group_id == record.group_id) {
                task.advance(TaskState::Compensated);
            }
        }
    }

    pub fn count(&self, outcome: CompensationOutcome) -> usize {
        self.records.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Issues undo calls concurrently, one per succeeded group.
#[derive(Clone)]
pub struct CompensationManager {
    registry: Arc<AdapterRegistry>,
}

impl CompensationManager {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Compensates every `Succeeded` task in `join`. Failed and timed-out
    /// groups are never touched. A failing undo does not stop the others.
    pub async fn compensate(&self, ctx: &RunContext, join: &JoinResult) -> CompensationReport {
        let timeout = Duration::from_millis(ctx.config.compensation_timeout_ms);
        let attempts = join
            .succeeded_tasks()
            .map(|task| self.compensate_one(ctx, task, timeout));

        let mut records = join_all(attempts).await;
        records.sort_by(|a, b| a.group_id.cmp(&b.group_id));

        let report = CompensationReport { records };
        for record in &report.records {
            metrics::COMPENSATIONS
                .with_label_values(&[record.outcome.as_str()])
                .inc();
        }
        info!(
            run_id = %ctx.run_id,
            reversed = report.count(CompensationOutcome::Reversed),
            irreversible = report.count(CompensationOutcome::Irreversible),
            skipped = report.count(CompensationOutcome::Skipped),
            failed = report.count(CompensationOutcome::Failed),
            status = %report.status(),
            "Compensation finished"
        );
        report
    }

    async fn compensate_one(
        &self,
        ctx: &RunContext,
        task: &GroupTask,
        timeout: Duration,
    ) -> CompensationRecord {
        let group_id = task.group_id.clone();
        let record = |outcome: CompensationOutcome, reason: Option<String>| CompensationRecord {
            group_id: group_id.clone(),
            outcome,
            reason,
            attempted_at: Utc::now(),
        };

        let Some(adapter) = self.registry.get(&task.group_id) else {
            warn!(run_id = %ctx.run_id, group = %task.group_id, "No adapter for compensation");
            return record(
                CompensationOutcome::Skipped,
                Some("no adapter registered".to_string()),
            );
        };

        let undo_supported = ctx
            .config
            .groups
            .iter()
            .find(|d| d.group_id == task.group_id)
            .map(|d| d.undo_supported)
            .unwrap_or_else(|| adapter.describe().undo_supported);
        if !undo_supported {
            info!(run_id = %ctx.run_id, group = %task.group_id, "Group has no undo, recorded irreversible");
            return record(
                CompensationOutcome::Irreversible,
                Some("group does not support undo".to_string()),
            );
        }

        let Some(result) = task.result.as_ref() else {
            return record(
                CompensationOutcome::Skipped,
                Some("task has no recorded result".to_string()),
            );
        };

        // Undo runs to completion even for cancelled runs.
        let exec_ctx = ExecutionContext::new(
            &ctx.run_id,
            &ctx.workspace_id,
            &task.group_id,
            CancelSignal::never(),
        );
        let call = AssertUnwindSafe(adapter.undo(&exec_ctx, result)).catch_unwind();

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(UndoOutcome::Reversed))) => record(CompensationOutcome::Reversed, None),
            Ok(Ok(Ok(UndoOutcome::Irreversible))) => record(
                CompensationOutcome::Irreversible,
                Some("group reported the work as irreversible".to_string()),
            ),
            Ok(Ok(Err(err))) => {
                warn!(run_id = %ctx.run_id, group = %task.group_id, error = %err, "Undo failed");
                record(CompensationOutcome::Failed, Some(err.to_string()))
            }
            Ok(Err(panic)) => {
                let err = AdapterError::from_panic(&task.group_id, panic);
                warn!(run_id = %ctx.run_id, group = %task.group_id, error = %err, "Undo panicked");
                record(CompensationOutcome::Failed, Some(err.to_string()))
            }
            Err(_) => {
                let err = TimeoutError::Compensation {
                    group_id: task.group_id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!(run_id = %ctx.run_id, group = %task.group_id, error = %err, "Undo timed out");
                record(CompensationOutcome::Failed, Some(err.to_string()))
            }
        }
    }
}
