//! Fan-out of one task per group and the deadline-bounded join.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::TimeoutError;
use crate::adapter::{AdapterError, AdapterRegistry, ExecutionContext, GroupAdapter};
use crate::metrics;
use crate::run::{CancelSignal, GroupTask, JoinResult, RunContext, TaskState};

/// Tasks launched for one run, waiting to be joined.
pub struct InFlight {
    run_id: String,
    tasks: Vec<GroupTask>,
    handles: Vec<JoinHandle<()>>,
    rx: mpsc::Receiver<GroupTask>,
    cancel: CancelSignal,
}

impl InFlight {
    /// Tasks as they were at fan-out time.
    pub fn tasks(&self) -> &[GroupTask] {
        &self.tasks
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stops every group task and waits until none of them is still running.
    ///
    /// Tasks that reported before the abort keep their terminal state; the
    /// rest are recorded `TimedOut` as cancelled. Ordered by group id.
    pub async fn abort(mut self) -> Vec<GroupTask> {
        let handles = std::mem::take(&mut self.handles);
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            // Cancelled or finished, either way the adapter future is gone.
            let _ = handle.await;
        }

        let mut pending: BTreeMap<String, GroupTask> = std::mem::take(&mut self.tasks)
            .into_iter()
            .map(|t| (t.group_id.clone(), t))
            .collect();
        let mut tasks = Vec::with_capacity(pending.len());
        while let Ok(task) = self.rx.try_recv() {
            pending.remove(&task.group_id);
            tasks.push(task);
        }
        let reported = tasks.len();

        for (group_id, mut task) in pending {
            task.time_out(TimeoutError::Cancelled { group_id }.to_string());
            observe_task(&task);
            tasks.push(task);
        }
        tasks.sort_by(|a, b| a.group_id.cmp(&b.group_id));

        warn!(
            run_id = %self.run_id,
            reported,
            aborted = tasks.len() - reported,
            "Group tasks aborted"
        );
        tasks
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Launches group tasks concurrently and joins them under a run deadline.
#[derive(Clone)]
pub struct TaskScheduler {
    registry: Arc<AdapterRegistry>,
}

impl TaskScheduler {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Starts one task per group in the run's configuration.
    ///
    /// Each task reports its own terminal state exactly once over a channel; it
    /// is the only writer of its `GroupTask`.
    pub fn fan_out(&self, ctx: &RunContext, cancel: CancelSignal) -> InFlight {
        let groups = &ctx.config.groups;
        let (tx, rx) = mpsc::channel(groups.len().max(1));
        let task_timeout = Duration::from_millis(ctx.config.task_timeout_ms);

        let mut tasks = Vec::with_capacity(groups.len());
        let mut handles = Vec::with_capacity(groups.len());

        for descriptor in groups {
            let mut task = GroupTask::new(&ctx.run_id, descriptor, ctx.config.input.clone());
            task.mark_running();
            tasks.push(task.clone());

            let exec_ctx = ExecutionContext::new(
                &ctx.run_id,
                &ctx.workspace_id,
                &descriptor.group_id,
                cancel.clone(),
            );
            let adapter = self.registry.get(&descriptor.group_id);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                let task = run_group_task(task, adapter, exec_ctx, task_timeout).await;
                // The receiver is gone only if the join was abandoned.
                let _ = tx.send(task).await;
            }));
        }

        info!(
            run_id = %ctx.run_id,
            workspace_id = %ctx.workspace_id,
            groups = tasks.len(),
            "Fanned out group tasks"
        );

        InFlight {
            run_id: ctx.run_id.clone(),
            tasks,
            handles,
            rx,
            cancel,
        }
    }

    /// Waits until every task is terminal or `deadline` passes.
    ///
    /// Tasks still running at the deadline are recorded `TimedOut`. A run
    /// cancellation makes every task finish promptly, and the join is then
    /// treated like a deadline-cut join.
    pub async fn join(&self, mut in_flight: InFlight, deadline: Instant) -> JoinResult {
        let run_id = in_flight.run_id.clone();
        let handles = std::mem::take(&mut in_flight.handles);
        let rx = &mut in_flight.rx;

        let mut pending: BTreeMap<String, GroupTask> = std::mem::take(&mut in_flight.tasks)
            .into_iter()
            .map(|t| (t.group_id.clone(), t))
            .collect();
        let mut finished = Vec::with_capacity(pending.len());
        let mut deadline_hit = false;
        let mut channel_closed = false;

        while !pending.is_empty() {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Some(task) => {
                        pending.remove(&task.group_id);
                        finished.push(task);
                    }
                    None => {
                        channel_closed = true;
                        break;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        // Anything sent in the same instant the deadline fired still counts.
        while let Ok(task) = rx.try_recv() {
            pending.remove(&task.group_id);
            finished.push(task);
        }

        let cancelled = in_flight.cancel.is_cancelled();
        for (group_id, mut task) in pending {
            if channel_closed {
                task.fail("task ended without reporting a result");
            } else {
                let err = if cancelled {
                    TimeoutError::Cancelled {
                        group_id: group_id.clone(),
                    }
                } else {
                    TimeoutError::RunDeadline {
                        group_id: group_id.clone(),
                    }
                };
                task.time_out(err.to_string());
            }
            warn!(run_id = %run_id, group = %group_id, state = %task.state, "Group task cut short");
            observe_task(&task);
            finished.push(task);
        }

        for handle in handles {
            handle.abort();
        }

        let join = JoinResult::from_tasks(finished, deadline_hit, cancelled);
        info!(
            run_id = %run_id,
            total = join.total,
            succeeded = join.succeeded,
            failed = join.failed,
            timed_out = join.timed_out,
            deadline_hit,
            cancelled,
            "Join complete"
        );
        join
    }
}

/// Drives one group's `execute` to a terminal task state. Never panics.
async fn run_group_task(
    mut task: GroupTask,
    adapter: Option<Arc<dyn GroupAdapter>>,
    ctx: ExecutionContext,
    task_timeout: Duration,
) -> GroupTask {
    let Some(adapter) = adapter else {
        task.fail(format!("No adapter registered for group {}", task.group_id));
        observe_task(&task);
        return task;
    };

    let input: Value = task.input.clone();
    let call = AssertUnwindSafe(adapter.execute(&ctx, &input)).catch_unwind();

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            task.time_out(TimeoutError::Cancelled { group_id: ctx.group_id.clone() }.to_string());
        }
        outcome = tokio::time::timeout(task_timeout, call) => match outcome {
            Err(_) => {
                task.time_out(
                    TimeoutError::Task {
                        group_id: ctx.group_id.clone(),
                        timeout_ms: task_timeout.as_millis() as u64,
                    }
                    .to_string(),
                );
            }
            Ok(Err(panic)) => {
                let err = AdapterError::from_panic(&ctx.group_id, panic);
                warn!(run_id = %ctx.run_id, group = %ctx.group_id, error = %err, "Group adapter panicked");
                task.fail(err.to_string());
            }
            Ok(Ok(Err(err))) => {
                debug!(run_id = %ctx.run_id, group = %ctx.group_id, error = %err, "Group execute failed");
                task.fail(err.to_string());
            }
            Ok(Ok(Ok(result))) => {
                task.succeed(result);
            }
        }
    }

    observe_task(&task);
    task
}

fn observe_task(task: &GroupTask) {
    if task.state == TaskState::Running {
        return;
    }
    if let Some(ms) = task.duration_ms() {
        metrics::GROUP_TASK_DURATION
            .with_label_values(&[task.group_id.as_str(), task.state.as_str()])
            .observe(ms as f64 / 1000.0);
    }
}
