//! Coordinator that drives runs through their state machine.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{CoordinatorError, CoordinatorStatus, InFlightRun, RunHandle, WorkspacePlan};
use crate::activity::{ActivityEntry, ActivityFilter, ActivityLog, ActivityRecorder};
use crate::adapter::AdapterRegistry;
use crate::compensation::CompensationManager;
use crate::config::{CoordinatorConfig, WorkspaceConfig};
use crate::gate::GatePolicy;
use crate::metrics;
use crate::notifier::{LogNotifier, Notifier, RunOutcomeReport};
use crate::persistence::PersistenceError;
use crate::run::{
    cancel_pair, CancelHandle, CancelSignal, GateVerdict, JoinResult, RunContext, RunFilter,
    RunRecord, RunState, RunStore, RunTrigger, TerminalStatus,
};
use crate::scheduler::TaskScheduler;
use crate::workspace::{QuotaTracker, WorkspaceLease, WorkspaceLocks};

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

/// Owns every run from `Idle -> Initializing` back to `Idle`.
///
/// One coordinator serves all workspaces. Each run is driven by its own
/// tokio task, which is the only writer of the run's activity trail and
/// record. A workspace never has more than one run in flight.
pub struct Coordinator {
    workspaces: BTreeMap<String, WorkspacePlan>,
    registry: Arc<AdapterRegistry>,
    scheduler: TaskScheduler,
    compensation: CompensationManager,
    runs: Arc<dyn RunStore>,
    activity: ActivityRecorder,
    notifier: Arc<dyn Notifier>,
    locks: WorkspaceLocks,
    quotas: QuotaTracker,
    in_flight: Mutex<HashMap<String, CancelHandle>>,
    outcomes: broadcast::Sender<RunRecord>,
}

impl Coordinator {
    /// Resolves every workspace against the registry. Fails on the first
    /// workspace that references a group the registry does not know.
    pub fn new(
        workspaces: &[WorkspaceConfig],
        defaults: &CoordinatorConfig,
        registry: Arc<AdapterRegistry>,
        runs: Arc<dyn RunStore>,
        activity: Arc<dyn ActivityLog>,
    ) -> Result<Self, CoordinatorError> {
        let mut plans = BTreeMap::new();
        for ws in workspaces {
            let plan = WorkspacePlan::resolve(ws, defaults, &registry)?;
            plans.insert(plan.workspace_id.clone(), plan);
        }
        let (outcomes, _) = broadcast::channel(OUTCOME_CHANNEL_CAPACITY);

        Ok(Self {
            workspaces: plans,
            scheduler: TaskScheduler::new(Arc::clone(&registry)),
            compensation: CompensationManager::new(Arc::clone(&registry)),
            registry,
            runs,
            activity: ActivityRecorder::new(activity),
            notifier: Arc::new(LogNotifier::new()),
            locks: WorkspaceLocks::new(),
            quotas: QuotaTracker::new(),
            in_flight: Mutex::new(HashMap::new()),
            outcomes,
        })
    }

    /// Replaces the default log notifier.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        Arc::clone(&self.notifier)
    }

    pub fn workspace(&self, workspace_id: &str) -> Option<&WorkspacePlan> {
        self.workspaces.get(workspace_id)
    }

    pub fn workspace_ids(&self) -> Vec<String> {
        self.workspaces.keys().cloned().collect()
    }

    /// Workspaces with a schedule, and their interval.
    pub fn scheduled_workspaces(&self) -> Vec<(String, Duration)> {
        self.workspaces
            .values()
            .filter_map(|p| p.schedule_interval.map(|i| (p.workspace_id.clone(), i)))
            .collect()
    }

    /// Every terminal run record, as it is finalized.
    pub fn subscribe(&self) -> broadcast::Receiver<RunRecord> {
        self.outcomes.subscribe()
    }

    pub fn is_locked(&self, workspace_id: &str) -> bool {
        self.locks.is_locked(workspace_id)
    }

    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            workspaces: self.workspace_ids(),
            groups: self.registry.group_ids(),
            in_flight: self
                .locks
                .held()
                .into_iter()
                .map(|(workspace_id, run_id)| InFlightRun {
                    workspace_id,
                    run_id,
                })
                .collect(),
        }
    }

    // ========================================================================
    // Operational surface
    // ========================================================================

    /// Starts a run for `workspace_id` and drives it in the background.
    ///
    /// Lock contention is reported before any run is created. A quota
    /// rejection creates the run, records it `Errored` and returns
    /// [`CoordinatorError::QuotaExhausted`].
    pub async fn start_run(
        self: &Arc<Self>,
        workspace_id: &str,
        trigger: RunTrigger,
        requested_by: &str,
    ) -> Result<RunHandle, CoordinatorError> {
        let plan = self
            .workspaces
            .get(workspace_id)
            .ok_or_else(|| CoordinatorError::UnknownWorkspace(workspace_id.to_string()))?;

        let run_id = Uuid::new_v4().to_string();
        let lease = self.locks.try_acquire(workspace_id, &run_id).map_err(|e| {
            metrics::LOCK_CONTENTION.inc();
            warn!(
                workspace_id,
                holder = %e.holder_run_id,
                "Run rejected, workspace locked"
            );
            CoordinatorError::LockContention(e)
        })?;
        metrics::RUNS_IN_FLIGHT.inc();

        let ctx = match build_context(&run_id, plan, trigger, requested_by) {
            Ok(ctx) => ctx,
            Err(e) => {
                metrics::RUNS_IN_FLIGHT.dec();
                return Err(e.into());
            }
        };
        let mut record = RunRecord::new(ctx);
        if let Err(e) = self.runs.insert(&record) {
            metrics::RUNS_IN_FLIGHT.dec();
            error!(run_id = %run_id, error = %e, "Failed to persist new run");
            return Err(e.into());
        }
        metrics::RUNS_STARTED
            .with_label_values(&[trigger.as_str()])
            .inc();
        info!(
            run_id = %run_id,
            workspace_id,
            trigger = trigger.as_str(),
            requested_by,
            "Starting run"
        );

        let admission = self
            .transition(
                &mut record,
                RunState::Initializing,
                json!({ "trigger": trigger.as_str(), "requested_by": requested_by }),
            )
            .and_then(|()| {
                self.quotas
                    .try_admit(workspace_id, &plan.quota)
                    .map_err(|source| CoordinatorError::QuotaExhausted {
                        run_id: run_id.clone(),
                        source,
                    })
            });

        if let Err(e) = admission {
            warn!(run_id = %run_id, error = %e, "Run failed to initialize");
            let message = e.to_string();
            self.fail_run(&mut record, &message);
            self.finalize(record, lease).await;
            return Err(e);
        }

        let (cancel, signal) = cancel_pair();
        self.in_flight
            .lock()
            .unwrap()
            .insert(run_id.clone(), cancel);

        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move { coordinator.drive(record, lease, signal).await });

        Ok(RunHandle {
            run_id,
            workspace_id: workspace_id.to_string(),
            handle,
        })
    }

    /// Latest persisted record of a run.
    pub fn run_status(&self, run_id: &str) -> Result<RunRecord, CoordinatorError> {
        self.runs
            .get(run_id)?
            .ok_or_else(|| CoordinatorError::RunNotFound(run_id.to_string()))
    }

    /// Signals cancellation to every in-flight group call of the run. The run
    /// still goes through evaluation and compensation.
    pub fn cancel_run(&self, run_id: &str) -> Result<(), CoordinatorError> {
        if let Some(handle) = self.in_flight.lock().unwrap().get(run_id) {
            handle.cancel();
            info!(run_id, "Run cancellation requested");
            return Ok(());
        }
        match self.runs.get(run_id)? {
            Some(_) => Err(CoordinatorError::RunAlreadyFinished(run_id.to_string())),
            None => Err(CoordinatorError::RunNotFound(run_id.to_string())),
        }
    }

    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<RunRecord>, CoordinatorError> {
        Ok(self.runs.list(filter)?)
    }

    pub fn count_runs(&self, filter: &RunFilter) -> Result<i64, CoordinatorError> {
        Ok(self.runs.count(filter)?)
    }

    pub fn activity(&self, filter: &ActivityFilter) -> Result<Vec<ActivityEntry>, CoordinatorError> {
        Ok(self.activity.log().query(filter)?)
    }

    pub fn count_activity(&self, filter: &ActivityFilter) -> Result<i64, CoordinatorError> {
        Ok(self.activity.log().count(filter)?)
    }

    /// Closes out runs left unfinished by a previous process.
    ///
    /// Each one is recorded `Errored` and then `Idle`; none of its group
    /// tasks is resumed. Locks live in memory, so nothing else is held.
    /// A run whose trail already reached `Idle` keeps the status its
    /// closing entry recorded. Returns the recovered records.
    pub async fn recover(&self) -> Result<Vec<RunRecord>, CoordinatorError> {
        let active = self.runs.list_active()?;
        if active.is_empty() {
            return Ok(Vec::new());
        }
        info!(count = active.len(), "Recovering unfinished runs");

        let mut recovered = Vec::with_capacity(active.len());
        for mut record in active {
            let run_id = record.run_id().to_string();
            let workspace_id = record.workspace_id().to_string();
            let detail = json!({ "reason": "coordinator restarted" });

            let last = self.activity.log().last_for_run(&run_id)?;
            if let Some(entry) = last.filter(|e| e.to_state == RunState::Idle) {
                self.settle_from_trail(&mut record, &entry)?;
                self.notify(&record).await;
                recovered.push(record);
                continue;
            }

            let trail_state = self.activity.resume(&run_id)?;
            if trail_state != RunState::Idle {
                if trail_state != RunState::Errored {
                    self.activity.record(
                        &run_id,
                        &workspace_id,
                        trail_state,
                        RunState::Errored,
                        detail.clone(),
                    )?;
                }
                self.activity
                    .record(&run_id, &workspace_id, RunState::Errored, RunState::Idle, detail)?;
            }

            for task in record.tasks.iter_mut().filter(|t| !t.state.is_terminal()) {
                task.fail("interrupted by coordinator restart");
            }
            let now = Utc::now();
            record.state = RunState::Idle;
            record.status = Some(TerminalStatus::Errored);
            record.error = Some("interrupted by coordinator restart".to_string());
            record.updated_at = now;
            record.finished_at = Some(now);
            self.runs.update(&record)?;

            metrics::RUNS_FINISHED
                .with_label_values(&[TerminalStatus::Errored.as_str()])
                .inc();
            warn!(run_id = %run_id, workspace_id = %workspace_id, from = %trail_state, "Recovered run marked errored");
            self.notify(&record).await;
            recovered.push(record);
        }
        Ok(recovered)
    }

    /// The trail already ended the run; only its final snapshot was lost.
    /// The status is taken from the closing entry so record and trail agree.
    fn settle_from_trail(
        &self,
        record: &mut RunRecord,
        closing: &ActivityEntry,
    ) -> Result<(), CoordinatorError> {
        let status = closing
            .detail
            .get("status")
            .and_then(Value::as_str)
            .and_then(TerminalStatus::parse)
            .unwrap_or(TerminalStatus::Errored);

        for task in record.tasks.iter_mut().filter(|t| !t.state.is_terminal()) {
            task.fail("interrupted by coordinator restart");
        }
        if status == TerminalStatus::Errored && record.error.is_none() {
            record.error = closing
                .detail
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        record.state = RunState::Idle;
        record.status = Some(status);
        record.finished_at = Some(closing.timestamp);
        record.updated_at = Utc::now();
        self.runs.update(record)?;

        metrics::RUNS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
        info!(
            run_id = %record.run_id(),
            workspace_id = %record.workspace_id(),
            status = %status,
            "Recovered run settled from its activity trail"
        );
        Ok(())
    }

    // ========================================================================
    // Run driver
    // ========================================================================

    async fn drive(
        self: Arc<Self>,
        mut record: RunRecord,
        lease: WorkspaceLease,
        cancel: CancelSignal,
    ) -> RunRecord {
        if let Err(e) = self.coordinate(&mut record, cancel).await {
            error!(run_id = %record.run_id(), error = %e, "Run errored");
            self.unwind(&mut record).await;
            self.fail_run(&mut record, &e.to_string());
        }
        self.finalize(record, lease).await
    }

    async fn coordinate(
        &self,
        record: &mut RunRecord,
        cancel: CancelSignal,
    ) -> Result<(), CoordinatorError> {
        let ctx = record.context.clone();

        self.transition(
            record,
            RunState::Coordinating,
            json!({ "groups": ctx.config.groups.len() }),
        )?;

        let in_flight = self.scheduler.fan_out(&ctx, cancel);
        record.tasks = in_flight.tasks().to_vec();
        if let Err(e) = self.persist(record) {
            // No group call may outlive the run.
            self.signal_cancel(&ctx.run_id);
            record.tasks = in_flight.abort().await;
            return Err(e);
        }

        let deadline = Instant::now() + Duration::from_millis(ctx.config.run_timeout_ms);
        let join = self.scheduler.join(in_flight, deadline).await;
        record.tasks = join.tasks.clone();
        record.join = Some(join.clone());

        self.transition(
            record,
            RunState::Evaluating,
            json!({
                "succeeded": join.succeeded,
                "failed": join.failed,
                "timed_out": join.timed_out,
                "deadline_hit": join.deadline_hit,
                "cancelled": join.cancelled,
            }),
        )?;

        let decision = GatePolicy::new(ctx.config.min_success_ratio).evaluate(&join);
        metrics::GATE_DECISIONS
            .with_label_values(&[decision.verdict.as_str()])
            .inc();
        info!(
            run_id = %ctx.run_id,
            verdict = decision.verdict.as_str(),
            score = decision.score,
            threshold = decision.threshold,
            "Gate decided"
        );
        let decision_detail = json!({
            "verdict": decision.verdict.as_str(),
            "score": decision.score,
            "threshold": decision.threshold,
            "missing_required": decision.missing_required,
        });
        let verdict = decision.verdict;
        record.decision = Some(decision);

        match verdict {
            GateVerdict::Commit => {
                self.transition(record, RunState::Committing, decision_detail)?;
                record.status = Some(TerminalStatus::Committed);
                record.finished_at = Some(Utc::now());
                self.transition(
                    record,
                    RunState::Idle,
                    json!({ "status": TerminalStatus::Committed.as_str() }),
                )?;
            }
            GateVerdict::Compensate => {
                self.transition(record, RunState::Compensating, decision_detail)?;
                let report = self.compensation.compensate(&ctx, &join).await;
                report.apply_to(&mut record.tasks);
                let status = report.status();
                record.compensation = report.records;
                record.status = Some(status);
                record.finished_at = Some(Utc::now());
                self.transition(
                    record,
                    RunState::Idle,
                    json!({
                        "status": status.as_str(),
                        "compensations": record.compensation.len(),
                    }),
                )?;
            }
        }
        Ok(())
    }

    fn signal_cancel(&self, run_id: &str) {
        if let Some(handle) = self.in_flight.lock().unwrap().get(run_id) {
            handle.cancel();
        }
    }

    /// Undoes the groups that succeeded in a run that errored before its
    /// outcome was settled.
    ///
    /// A run that got as far as `Committing` keeps its work, and a run whose
    /// compensation already ran is not compensated twice.
    async fn unwind(&self, record: &mut RunRecord) {
        if record.state == RunState::Committing
            || record.status == Some(TerminalStatus::Committed)
            || !record.compensation.is_empty()
        {
            return;
        }
        let join = JoinResult::from_tasks(record.tasks.clone(), false, false);
        if join.succeeded == 0 {
            return;
        }

        warn!(
            run_id = %record.run_id(),
            groups = join.succeeded,
            "Compensating succeeded groups of errored run"
        );
        let report = self.compensation.compensate(&record.context, &join).await;
        report.apply_to(&mut record.tasks);
        record.compensation = report.records;
    }

    /// Writes the activity entry for `record.state -> to`, then the record.
    fn transition(
        &self,
        record: &mut RunRecord,
        to: RunState,
        detail: Value,
    ) -> Result<(), CoordinatorError> {
        self.activity.record(
            record.run_id(),
            record.workspace_id(),
            record.state,
            to,
            detail,
        )?;
        record.state = to;
        self.persist(record)
    }

    fn persist(&self, record: &mut RunRecord) -> Result<(), CoordinatorError> {
        record.updated_at = Utc::now();
        self.runs.update(record)?;
        Ok(())
    }

    /// Best-effort move to `Errored` and back to `Idle`. Write failures are
    /// logged; the in-memory record always ends terminal.
    fn fail_run(&self, record: &mut RunRecord, reason: &str) {
        let run_id = record.run_id().to_string();
        let workspace_id = record.workspace_id().to_string();
        let detail = json!({
            "error": reason,
            "compensations": record.compensation.len(),
        });

        for task in record.tasks.iter_mut().filter(|t| !t.state.is_terminal()) {
            task.fail("run errored");
        }

        if record.state != RunState::Idle && record.state != RunState::Errored {
            match self.activity.record(
                &run_id,
                &workspace_id,
                record.state,
                RunState::Errored,
                detail.clone(),
            ) {
                Ok(_) => record.state = RunState::Errored,
                Err(e) => error!(run_id = %run_id, error = %e, "Failed to record errored transition"),
            }
        }
        if record.state == RunState::Errored {
            if let Err(e) =
                self.activity
                    .record(&run_id, &workspace_id, RunState::Errored, RunState::Idle, detail)
            {
                error!(run_id = %run_id, error = %e, "Failed to record final transition");
            }
        }

        let now = Utc::now();
        record.state = RunState::Idle;
        record.status = Some(TerminalStatus::Errored);
        record.error = Some(reason.to_string());
        record.updated_at = now;
        record.finished_at = Some(now);
        if let Err(e) = self.runs.update(record) {
            error!(run_id = %run_id, error = %e, "Failed to persist errored run");
        }
    }

    /// Releases the workspace, publishes the outcome and hands back the record.
    async fn finalize(&self, record: RunRecord, lease: WorkspaceLease) -> RunRecord {
        lease.release();
        self.in_flight.lock().unwrap().remove(record.run_id());
        metrics::RUNS_IN_FLIGHT.dec();

        let status = record.status.unwrap_or(TerminalStatus::Errored);
        metrics::RUNS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
        if let Some(ms) = record.duration_ms() {
            metrics::RUN_DURATION
                .with_label_values(&[status.as_str()])
                .observe(ms as f64 / 1000.0);
        }
        info!(
            run_id = %record.run_id(),
            workspace_id = %record.workspace_id(),
            status = %status,
            duration_ms = record.duration_ms(),
            "Run finished"
        );

        self.notify(&record).await;
        // No subscribers is fine.
        let _ = self.outcomes.send(record.clone());
        record
    }

    async fn notify(&self, record: &RunRecord) {
        let report = RunOutcomeReport::from(record);
        if let Err(e) = self.notifier.report_run_outcome(&report).await {
            warn!(
                run_id = %record.run_id(),
                notifier = self.notifier.name(),
                error = %e,
                "Failed to deliver run outcome"
            );
        }
    }
}

fn build_context(
    run_id: &str,
    plan: &WorkspacePlan,
    trigger: RunTrigger,
    requested_by: &str,
) -> Result<RunContext, PersistenceError> {
    let config = plan.snapshot();
    let config_hash = Sha256::digest(serde_json::to_vec(&config)?)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();

    Ok(RunContext {
        run_id: run_id.to_string(),
        workspace_id: plan.workspace_id.clone(),
        requested_at: Utc::now(),
        requested_by: requested_by.to_string(),
        trigger,
        config,
        config_hash,
        quota: plan.quota,
    })
}
