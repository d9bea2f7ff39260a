//! Core run data types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::GroupDescriptor;
use crate::workspace::ResourceQuota;

// ============================================================================
// Run state machine
// ============================================================================

/// Coordinator state for one run.
///
/// `Idle -> Initializing -> Coordinating -> Evaluating -> {Committing | Compensating} -> Idle`,
/// with `Errored` reachable from any active state and leading back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Initializing,
    Coordinating,
    Evaluating,
    Committing,
    Compensating,
    Errored,
}

impl RunState {
    /// Returns true if `next` is a legal successor of this state.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Coordinating)
                | (Coordinating, Evaluating)
                | (Evaluating, Committing)
                | (Evaluating, Compensating)
                | (Committing, Idle)
                | (Compensating, Idle)
                | (Errored, Idle)
                | (
                    Initializing | Coordinating | Evaluating | Committing | Compensating,
                    Errored
                )
        )
    }

    /// Returns true while the run holds its workspace lock.
    pub fn is_active(self) -> bool {
        !matches!(self, RunState::Idle)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Initializing => "initializing",
            RunState::Coordinating => "coordinating",
            RunState::Evaluating => "evaluating",
            RunState::Committing => "committing",
            RunState::Compensating => "compensating",
            RunState::Errored => "errored",
        }
    }

    pub fn parse(s: &str) -> Option<RunState> {
        Some(match s {
            "idle" => RunState::Idle,
            "initializing" => RunState::Initializing,
            "coordinating" => RunState::Coordinating,
            "evaluating" => RunState::Evaluating,
            "committing" => RunState::Committing,
            "compensating" => RunState::Compensating,
            "errored" => RunState::Errored,
            _ => return None,
        })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a finished run ended. Reported by `get-run-status` once the run is idle again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Committed,
    Compensated,
    PartiallyCompensated,
    Errored,
}

impl TerminalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TerminalStatus::Committed => "committed",
            TerminalStatus::Compensated => "compensated",
            TerminalStatus::PartiallyCompensated => "partially_compensated",
            TerminalStatus::Errored => "errored",
        }
    }

    pub fn parse(s: &str) -> Option<TerminalStatus> {
        Some(match s {
            "committed" => TerminalStatus::Committed,
            "compensated" => TerminalStatus::Compensated,
            "partially_compensated" => TerminalStatus::PartiallyCompensated,
            "errored" => TerminalStatus::Errored,
            _ => return None,
        })
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Started by the monitoring loop cadence.
    Scheduled,
    /// Started by an operator through the API or CLI.
    Manual,
}

impl RunTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

// ============================================================================
// Run context
// ============================================================================

/// Configuration pinned for the lifetime of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfigSnapshot {
    /// Groups fanned out to, with required flags already merged for the workspace.
    pub groups: Vec<GroupDescriptor>,
    pub min_success_ratio: f64,
    pub run_timeout_ms: u64,
    pub task_timeout_ms: u64,
    pub compensation_timeout_ms: u64,
    /// Payload handed to every group's `execute`.
    #[serde(default)]
    pub input: Value,
}

/// Isolated scope for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunContext {
    pub run_id: String,
    pub workspace_id: String,
    pub requested_at: DateTime<Utc>,
    pub requested_by: String,
    pub trigger: RunTrigger,
    pub config: RunConfigSnapshot,
    /// SHA-256 of the serialized snapshot.
    pub config_hash: String,
    pub quota: ResourceQuota,
}

// ============================================================================
// Group tasks
// ============================================================================

/// Lifecycle of one group's unit of work. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Compensated,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::TimedOut | TaskState::Compensated
        )
    }

    pub fn can_advance_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, TimedOut)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Succeeded, Compensated)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::TimedOut => "timed_out",
            TaskState::Compensated => "compensated",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for one group within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupTask {
    pub run_id: String,
    pub group_id: String,
    pub required: bool,
    #[serde(default)]
    pub input: Value,
    pub state: TaskState,
    /// Opaque to the coordinator; handed back to `undo` during compensation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl GroupTask {
    pub fn new(run_id: impl Into<String>, descriptor: &GroupDescriptor, input: Value) -> Self {
        Self {
            run_id: run_id.into(),
            group_id: descriptor.group_id.clone(),
            required: descriptor.required,
            input,
            state: TaskState::Pending,
            result: None,
            error: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Moves the task to `next` if that is a forward transition.
    ///
    /// Returns false (and leaves the task untouched) otherwise.
    pub fn advance(&mut self, next: TaskState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        let now = Utc::now();
        if next == TaskState::Running {
            self.started_at = Some(now);
        } else if matches!(
            next,
            TaskState::Succeeded | TaskState::Failed | TaskState::TimedOut
        ) {
            self.ended_at = Some(now);
        }
        self.state = next;
        true
    }

    pub fn mark_running(&mut self) -> bool {
        self.advance(TaskState::Running)
    }

    pub fn succeed(&mut self, result: Value) -> bool {
        let moved = self.advance(TaskState::Succeeded);
        if moved {
            self.result = Some(result);
        }
        moved
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let moved = self.advance(TaskState::Failed);
        if moved {
            self.error = Some(reason.into());
        }
        moved
    }

    pub fn time_out(&mut self, reason: impl Into<String>) -> bool {
        let moved = self.advance(TaskState::TimedOut);
        if moved {
            self.error = Some(reason.into());
        }
        moved
    }

    /// Wall-clock duration between start and end, if both are known.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds().max(0) as u64),
            _ => None,
        }
    }
}

// ============================================================================
// Join, gate, compensation
// ============================================================================

/// Aggregate of every task in a run once all are terminal or the deadline fired.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// The run-level deadline cut the join short.
    pub deadline_hit: bool,
    /// The run was cancelled while coordinating.
    pub cancelled: bool,
    /// Per-group details, ordered by group id.
    pub tasks: Vec<GroupTask>,
    pub joined_at: DateTime<Utc>,
}

impl JoinResult {
    pub fn from_tasks(mut tasks: Vec<GroupTask>, deadline_hit: bool, cancelled: bool) -> Self {
        tasks.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        let count = |state: TaskState| tasks.iter().filter(|t| t.state == state).count();
        Self {
            total: tasks.len(),
            succeeded: count(TaskState::Succeeded),
            failed: count(TaskState::Failed),
            timed_out: count(TaskState::TimedOut),
            deadline_hit,
            cancelled,
            joined_at: Utc::now(),
            tasks,
        }
    }

    /// Explicit failures plus timeouts.
    pub fn failures(&self) -> usize {
        self.failed + self.timed_out
    }

    /// `succeeded / total`; an empty join has ratio 0.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.total as f64
    }

    pub fn task(&self, group_id: &str) -> Option<&GroupTask> {
        self.tasks.iter().find(|t| t.group_id == group_id)
    }

    pub fn succeeded_tasks(&self) -> impl Iterator<Item = &GroupTask> {
        self.tasks
            .iter()
            .filter(|t| t.state == TaskState::Succeeded)
    }
}

/// Quality gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateVerdict {
    Commit,
    Compensate,
}

impl GateVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            GateVerdict::Commit => "commit",
            GateVerdict::Compensate => "compensate",
        }
    }
}

/// The gate's decision together with the numbers that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecision {
    pub verdict: GateVerdict,
    /// Success ratio of the join.
    pub score: f64,
    /// `min_success_ratio` in force for the run.
    pub threshold: f64,
    /// Required groups that did not succeed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_required: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

/// Outcome of one compensation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompensationOutcome {
    /// The group's work was undone.
    Reversed,
    /// The group cannot undo this kind of work.
    Irreversible,
    /// No undo was attempted (no adapter is registered for the group any more).
    Skipped,
    /// The undo call itself failed or timed out.
    Failed,
}

impl CompensationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            CompensationOutcome::Reversed => "reversed",
            CompensationOutcome::Irreversible => "irreversible",
            CompensationOutcome::Skipped => "skipped",
            CompensationOutcome::Failed => "failed",
        }
    }
}

/// Per-group undo attempt. Only exists for groups that had succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompensationRecord {
    pub group_id: String,
    pub outcome: CompensationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

// ============================================================================
// Persisted run record
// ============================================================================

/// Durable snapshot of a run: context plus everything the run produced so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub context: RunContext,
    pub state: RunState,
    #[serde(default)]
    pub tasks: Vec<GroupTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<GateDecision>,
    #[serde(default)]
    pub compensation: Vec<CompensationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TerminalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(context: RunContext) -> Self {
        Self {
            updated_at: context.requested_at,
            context,
            state: RunState::Idle,
            tasks: Vec::new(),
            join: None,
            decision: None,
            compensation: Vec::new(),
            status: None,
            error: None,
            finished_at: None,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.context.run_id
    }

    pub fn workspace_id(&self) -> &str {
        &self.context.workspace_id
    }

    /// Terminal once a status is set and the run is back to idle.
    pub fn is_terminal(&self) -> bool {
        self.status.is_some() && self.state == RunState::Idle
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at.map(|end| {
            (end - self.context.requested_at)
                .num_milliseconds()
                .max(0) as u64
        })
    }
}
