//! Mock group adapter for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::adapter::{AdapterError, ExecutionContext, GroupAdapter, GroupDescriptor, UndoOutcome};

/// A recorded execute call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedExecution {
    pub run_id: String,
    pub workspace_id: String,
    pub input: Value,
}

/// A recorded undo call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedUndo {
    pub run_id: String,
    /// The result handed back to undo.
    pub result: Value,
}

#[derive(Debug, Clone)]
struct Behavior {
    delay: Duration,
    fail: Option<String>,
    panic: bool,
    ignore_cancel: bool,
    result: Option<Value>,
    undo_outcome: UndoOutcome,
    undo_error: Option<String>,
    undo_panic: bool,
    undo_delay: Duration,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: None,
            panic: false,
            ignore_cancel: false,
            result: None,
            undo_outcome: UndoOutcome::Reversed,
            undo_error: None,
            undo_panic: false,
            undo_delay: Duration::ZERO,
        }
    }
}

/// Mock implementation of the GroupAdapter trait.
///
/// Provides controllable behavior for testing:
/// - Simulated latency, failure, or panic on execute
/// - Configurable undo outcome, error, panic or latency
/// - Recorded calls for assertions
///
/// Clones share state, so keep a clone around to inspect calls after handing the
/// adapter to a registry.
///
/// # Example
///
/// ```rust,ignore
/// use steward_core::testing::MockGroupAdapter;
///
/// let adapter = MockGroupAdapter::new("compliance").failing("rule engine down");
/// let calls = adapter.clone();
/// registry.register(Arc::new(adapter))?;
///
/// // ... run ...
/// assert_eq!(calls.execute_count().await, 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockGroupAdapter {
    descriptor: GroupDescriptor,
    behavior: Arc<RwLock<Behavior>>,
    executions: Arc<RwLock<Vec<RecordedExecution>>>,
    undos: Arc<RwLock<Vec<RecordedUndo>>>,
    /// Executes that got past their delay, i.e. were not dropped mid-call.
    completed: Arc<AtomicUsize>,
}

impl MockGroupAdapter {
    /// Create an optional, undoable group that succeeds immediately.
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            descriptor: GroupDescriptor::new(group_id),
            behavior: Arc::new(RwLock::new(Behavior::default())),
            executions: Arc::new(RwLock::new(Vec::new())),
            undos: Arc::new(RwLock::new(Vec::new())),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn configure(self, f: impl FnOnce(&mut Behavior)) -> Self {
        {
            let mut behavior = self
                .behavior
                .try_write()
                .expect("builder methods are used before the mock is shared");
            f(&mut behavior);
        }
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.descriptor.required = required;
        self
    }

    pub fn undo_supported(mut self, supported: bool) -> Self {
        self.descriptor.undo_supported = supported;
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.configure(|b| b.delay = delay)
    }

    pub fn failing(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.configure(|b| b.fail = Some(message))
    }

    pub fn panicking(self) -> Self {
        self.configure(|b| b.panic = true)
    }

    /// Keep sleeping through cancellation, like an adapter that ignores its context.
    pub fn ignoring_cancel(self) -> Self {
        self.configure(|b| b.ignore_cancel = true)
    }

    pub fn with_result(self, result: Value) -> Self {
        self.configure(|b| b.result = Some(result))
    }

    pub fn with_undo_outcome(self, outcome: UndoOutcome) -> Self {
        self.configure(|b| b.undo_outcome = outcome)
    }

    pub fn with_undo_error(self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.configure(|b| b.undo_error = Some(message))
    }

    pub fn undo_panicking(self) -> Self {
        self.configure(|b| b.undo_panic = true)
    }

    pub fn with_undo_delay(self, delay: Duration) -> Self {
        self.configure(|b| b.undo_delay = delay)
    }

    /// Change the execute latency after the mock is shared.
    pub async fn set_delay(&self, delay: Duration) {
        self.behavior.write().await.delay = delay;
    }

    /// Make subsequent executes fail (or succeed again with `None`).
    pub async fn set_failure(&self, message: Option<String>) {
        self.behavior.write().await.fail = message;
    }

    /// Get all recorded executions.
    pub async fn recorded_executions(&self) -> Vec<RecordedExecution> {
        self.executions.read().await.clone()
    }

    pub async fn execute_count(&self) -> usize {
        self.executions.read().await.len()
    }

    /// Executes that ran to the end instead of being cancelled or dropped.
    pub fn completed_executions(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Get all recorded undo calls.
    pub async fn recorded_undos(&self) -> Vec<RecordedUndo> {
        self.undos.read().await.clone()
    }

    pub async fn undo_count(&self) -> usize {
        self.undos.read().await.len()
    }
}

#[async_trait]
impl GroupAdapter for MockGroupAdapter {
    fn describe(&self) -> GroupDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, ctx: &ExecutionContext, input: &Value) -> Result<Value, AdapterError> {
        self.executions.write().await.push(RecordedExecution {
            run_id: ctx.run_id.clone(),
            workspace_id: ctx.workspace_id.clone(),
            input: input.clone(),
        });
        let behavior = self.behavior.read().await.clone();

        if !behavior.delay.is_zero() {
            if behavior.ignore_cancel {
                tokio::time::sleep(behavior.delay).await;
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(behavior.delay) => {}
                    _ = ctx.cancel.cancelled() => {
                        return Err(AdapterError::Cancelled(ctx.group_id.clone()));
                    }
                }
            }
        }

        self.completed.fetch_add(1, Ordering::SeqCst);

        if behavior.panic {
            panic!("mock adapter {} panicked", self.descriptor.group_id);
        }
        if let Some(message) = behavior.fail {
            return Err(AdapterError::failed(&self.descriptor.group_id, message));
        }

        Ok(behavior.result.unwrap_or_else(|| {
            json!({
                "group_id": self.descriptor.group_id,
                "run_id": ctx.run_id,
            })
        }))
    }

    async fn undo(
        &self,
        ctx: &ExecutionContext,
        result: &Value,
    ) -> Result<UndoOutcome, AdapterError> {
        self.undos.write().await.push(RecordedUndo {
            run_id: ctx.run_id.clone(),
            result: result.clone(),
        });
        let behavior = self.behavior.read().await.clone();

        if !behavior.undo_delay.is_zero() {
            tokio::time::sleep(behavior.undo_delay).await;
        }
        if behavior.undo_panic {
            panic!("mock adapter {} panicked during undo", self.descriptor.group_id);
        }
        if let Some(message) = behavior.undo_error {
            return Err(AdapterError::failed(&self.descriptor.group_id, message));
        }
        Ok(behavior.undo_outcome)
    }
}
