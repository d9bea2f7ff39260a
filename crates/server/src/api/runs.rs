//! Run API handlers: start, status, list and cancel.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use steward_core::run::{
    CompensationRecord, GateDecision, GroupTask, JoinResult, RunState, TerminalStatus,
};
use steward_core::{CoordinatorError, RunFilter, RunRecord, RunTrigger};

use super::middleware::AuthUser;
use crate::state::AppState;

/// Maximum allowed limit for run listings
const MAX_LIMIT: i64 = 1000;

/// Default limit for run listings
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for starting a run
#[derive(Debug, Deserialize)]
pub struct StartRunParams {
    /// Block until the run is back to idle (default true).
    pub wait: Option<bool>,
}

/// Query parameters for listing runs
#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    pub workspace_id: Option<String>,
    /// Terminal status (`committed`, `compensated`, `partially_compensated`, `errored`)
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Aggregate counts of the join, without the per-task details.
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub deadline_hit: bool,
    pub cancelled: bool,
}

impl From<&JoinResult> for JoinSummary {
    fn from(join: &JoinResult) -> Self {
        Self {
            total: join.total,
            succeeded: join.succeeded,
            failed: join.failed,
            timed_out: join.timed_out,
            deadline_hit: join.deadline_hit,
            cancelled: join.cancelled,
        }
    }
}

/// Run status with its per-group breakdown
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: String,
    pub workspace_id: String,
    pub trigger: RunTrigger,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub config_hash: String,
    pub state: RunState,
    pub status: Option<TerminalStatus>,
    pub groups: Vec<GroupTask>,
    pub join: Option<JoinSummary>,
    pub decision: Option<GateDecision>,
    pub compensation: Vec<CompensationRecord>,
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl From<RunRecord> for RunResponse {
    fn from(record: RunRecord) -> Self {
        let duration_ms = record.duration_ms();
        Self {
            join: record.join.as_ref().map(JoinSummary::from),
            run_id: record.context.run_id,
            workspace_id: record.context.workspace_id,
            trigger: record.context.trigger,
            requested_by: record.context.requested_by,
            requested_at: record.context.requested_at,
            config_hash: record.context.config_hash,
            state: record.state,
            status: record.status,
            groups: record.tasks,
            decision: record.decision,
            compensation: record.compensation,
            error: record.error,
            finished_at: record.finished_at,
            duration_ms,
        }
    }
}

/// Returned by `POST /workspaces/{id}/runs?wait=false`
#[derive(Debug, Serialize, Deserialize)]
pub struct RunStartedResponse {
    pub run_id: String,
    pub workspace_id: String,
}

/// Response for listing runs
#[derive(Debug, Serialize)]
pub struct ListRunsResponse {
    pub runs: Vec<RunResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub run_id: String,
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct RunErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<RunErrorResponse>);

fn error_response(err: &CoordinatorError) -> ApiError {
    let status = match err {
        CoordinatorError::UnknownWorkspace(_) | CoordinatorError::RunNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CoordinatorError::LockContention(_) | CoordinatorError::RunAlreadyFinished(_) => {
            StatusCode::CONFLICT
        }
        CoordinatorError::QuotaExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
        CoordinatorError::UnknownGroup { .. }
        | CoordinatorError::Persistence(_)
        | CoordinatorError::Activity(_)
        | CoordinatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(RunErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// HTTP status for a run that is back to idle.
///
/// An errored run is an internal error; a join cut by the run deadline is a
/// timeout whatever the gate decided.
pub fn finished_status(record: &RunRecord) -> StatusCode {
    if record.status == Some(TerminalStatus::Errored) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if record.join.as_ref().is_some_and(|j| j.deadline_hit) {
        return StatusCode::GATEWAY_TIMEOUT;
    }
    StatusCode::OK
}

// ============================================================================
// Handlers
// ============================================================================

/// Start a manual run for a workspace
pub async fn start_run(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Query(params): Query<StartRunParams>,
    AuthUser(user_id): AuthUser,
) -> Response {
    let handle = match state
        .coordinator()
        .start_run(&workspace_id, RunTrigger::Manual, &user_id)
        .await
    {
        Ok(handle) => handle,
        Err(e) => return error_response(&e).into_response(),
    };

    if !params.wait.unwrap_or(true) {
        info!(run_id = %handle.run_id(), workspace_id = %workspace_id, "Run accepted");
        return (
            StatusCode::ACCEPTED,
            Json(RunStartedResponse {
                run_id: handle.run_id().to_string(),
                workspace_id,
            }),
        )
            .into_response();
    }

    match handle.wait().await {
        Ok(record) => {
            let status = finished_status(&record);
            (status, Json(RunResponse::from(record))).into_response()
        }
        Err(e) => {
            error!(workspace_id = %workspace_id, error = %e, "Run task failed");
            error_response(&e).into_response()
        }
    }
}

/// Get a run by ID
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    state
        .coordinator()
        .run_status(&id)
        .map(|record| Json(RunResponse::from(record)))
        .map_err(|e| error_response(&e))
}

/// List runs with optional filters
pub async fn list_runs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListRunsParams>,
) -> Result<Json<ListRunsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = RunFilter::new();

    if let Some(ref workspace_id) = params.workspace_id {
        base_filter = base_filter.with_workspace_id(workspace_id);
    }

    if let Some(ref status) = params.status {
        let Some(status) = TerminalStatus::parse(status) else {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(RunErrorResponse {
                    error: format!("Unknown run status: {}", status),
                }),
            ));
        };
        base_filter = base_filter.with_status(status);
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = RunFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    let runs = state
        .coordinator()
        .list_runs(&query_filter)
        .map_err(|e| error_response(&e))?;
    let total = state
        .coordinator()
        .count_runs(&base_filter)
        .map_err(|e| error_response(&e))?;

    Ok(Json(ListRunsResponse {
        runs: runs.into_iter().map(RunResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Request cancellation of an in-flight run
pub async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .coordinator()
        .cancel_run(&id)
        .map_err(|e| error_response(&e))?;
    info!(run_id = %id, cancelled_by = %user_id, "Run cancel requested over API");
    Ok(Json(MessageResponse {
        run_id: id,
        message: "Cancellation requested".to_string(),
    }))
}
