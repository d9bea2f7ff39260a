//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the steward server:
//! - HTTP request metrics (latency, counts, errors)
//! - Authentication failures
//! - Coordinator and monitoring loop status (collected dynamically)
//!
//! Run, gate and compensation metrics live in `steward_core::metrics` and are
//! registered here alongside the HTTP ones.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "steward_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("steward_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "steward_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication and authorization failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "steward_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Status Metrics (collected dynamically)
// =============================================================================

/// Whether the monitoring loop is running (1 = running, 0 = stopped).
pub static MONITOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "steward_monitor_running",
        "Whether the monitoring loop is running",
    )
    .unwrap()
});

/// Whether a workspace is currently held by a run.
pub static WORKSPACE_LOCKED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "steward_workspace_locked",
            "Whether a run currently holds the workspace",
        ),
        &["workspace"],
    )
    .unwrap()
});

/// Rolling mean success ratio per workspace.
pub static WINDOW_SUCCESS_RATIO: Lazy<prometheus::GaugeVec> = Lazy::new(|| {
    prometheus::GaugeVec::new(
        Opts::new(
            "steward_window_success_ratio",
            "Mean success ratio over the monitoring window",
        ),
        &["workspace"],
    )
    .unwrap()
});

/// Register all metrics with the registry.
fn register_metrics(registry: &Registry) {
    // HTTP metrics
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Status metrics
    registry.register(Box::new(MONITOR_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(WORKSPACE_LOCKED.clone()))
        .unwrap();
    registry
        .register(Box::new(WINDOW_SUCCESS_RATIO.clone()))
        .unwrap();

    // Core metrics (runs, gate, compensation, alerts)
    for metric in steward_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the coordinator and monitor as
/// they are right now.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let coordinator = state.coordinator();
    for workspace_id in coordinator.workspace_ids() {
        let locked = coordinator.is_locked(&workspace_id);
        WORKSPACE_LOCKED
            .with_label_values(&[&workspace_id])
            .set(if locked { 1 } else { 0 });
    }

    let status = state.monitor().status();
    MONITOR_RUNNING.set(if status.running { 1 } else { 0 });
    for window in &status.windows {
        if let Some(ratio) = window.mean_success_ratio {
            WINDOW_SUCCESS_RATIO
                .with_label_values(&[&window.workspace_id])
                .set(ratio);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    // Workspace ids are operator-chosen, keep cardinality bounded.
    let workspace_regex = regex_lite::Regex::new(r"/workspaces/[^/]+").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = workspace_regex.replace_all(&result, "/workspaces/{workspace}");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_run_id() {
        let path = "/api/v1/runs/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/runs/{id}");
    }

    #[test]
    fn test_normalize_path_cancel() {
        let path = "/api/v1/runs/550e8400-e29b-41d4-a716-446655440000/cancel";
        assert_eq!(normalize_path(path), "/api/v1/runs/{id}/cancel");
    }

    #[test]
    fn test_normalize_path_workspace() {
        let path = "/api/v1/workspaces/finance-eu/runs";
        assert_eq!(normalize_path(path), "/api/v1/workspaces/{workspace}/runs");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        let path = "/api/v1/health";
        assert_eq!(normalize_path(path), "/api/v1/health");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("steward_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vector metrics that have a label set
        HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/test", "200"])
            .observe(0.1);
        HTTP_REQUESTS_IN_FLIGHT.set(0);
        MONITOR_RUNNING.set(0);
        steward_core::metrics::RUNS_STARTED
            .with_label_values(&["manual"])
            .inc_by(0);
        steward_core::metrics::LOCK_CONTENTION.inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("steward_http_request_duration_seconds"));
        assert!(output.contains("steward_http_requests_in_flight"));
        assert!(output.contains("steward_monitor_running"));
        assert!(output.contains("steward_runs_started_total"));
        assert!(output.contains("steward_lock_contention_total"));
    }
}
