//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Coordinator (runs started/finished, run duration, lock contention)
//! - Scheduler (per-group task latency)
//! - Quality gate and compensation outcomes
//! - Monitoring loop alerts

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Coordinator
// =============================================================================

/// Runs started total by trigger.
pub static RUNS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_runs_started_total", "Total runs started"),
        &["trigger"], // "scheduled", "manual"
    )
    .unwrap()
});

/// Runs finished total by terminal status.
pub static RUNS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_runs_finished_total", "Total runs finished"),
        &["status"], // "committed", "compensated", "partially_compensated", "errored"
    )
    .unwrap()
});

/// Run duration from request to terminal state.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("steward_run_duration_seconds", "Duration of a run")
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["status"],
    )
    .unwrap()
});

/// Runs currently holding a workspace lock.
pub static RUNS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("steward_runs_in_flight", "Runs currently in flight").unwrap()
});

/// Start attempts rejected because the workspace was busy.
pub static LOCK_CONTENTION: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "steward_lock_contention_total",
        "Run starts rejected because the workspace was locked",
    )
    .unwrap()
});

// =============================================================================
// Scheduler
// =============================================================================

/// Per-group task latency by terminal state.
pub static GROUP_TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "steward_group_task_duration_seconds",
            "Duration of one group's execute call",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["group", "state"],
    )
    .unwrap()
});

// =============================================================================
// Gate & compensation
// =============================================================================

/// Gate decisions by verdict.
pub static GATE_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_gate_decisions_total", "Total quality gate decisions"),
        &["verdict"],
    )
    .unwrap()
});

/// Compensation attempts by outcome.
pub static COMPENSATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_compensations_total", "Total compensation attempts"),
        &["outcome"], // "reversed", "irreversible", "skipped", "failed"
    )
    .unwrap()
});

// =============================================================================
// Monitoring
// =============================================================================

/// Alerts raised by kind.
pub static ALERTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_alerts_total", "Total alerts raised"),
        &["kind"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Coordinator
        Box::new(RUNS_STARTED.clone()),
        Box::new(RUNS_FINISHED.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(RUNS_IN_FLIGHT.clone()),
        Box::new(LOCK_CONTENTION.clone()),
        // Scheduler
        Box::new(GROUP_TASK_DURATION.clone()),
        // Gate & compensation
        Box::new(GATE_DECISIONS.clone()),
        Box::new(COMPENSATIONS.clone()),
        // Monitoring
        Box::new(ALERTS.clone()),
    ]
}
