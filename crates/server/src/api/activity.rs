use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use steward_core::{ActivityEntry, ActivityFilter, RunState};

use crate::state::AppState;

/// Maximum allowed limit for activity queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for activity queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for activity endpoint
#[derive(Debug, Deserialize)]
pub struct ActivityQueryParams {
    /// Filter by run ID
    pub run_id: Option<String>,
    /// Filter by workspace ID
    pub workspace_id: Option<String>,
    /// Filter by the state the run left
    pub from_state: Option<String>,
    /// Filter by the state the run entered
    pub to_state: Option<String>,
    /// Filter entries after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Filter entries before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of entries to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

/// Response for activity query endpoint
#[derive(Debug, Serialize)]
pub struct ActivityQueryResponse {
    pub entries: Vec<ActivityEntry>,
    /// Total number of matching entries
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response for activity queries
#[derive(Debug, Serialize)]
pub struct ActivityErrorResponse {
    pub error: String,
}

type ActivityError = (StatusCode, Json<ActivityErrorResponse>);

fn parse_state(value: &str) -> Result<RunState, ActivityError> {
    RunState::parse(value).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ActivityErrorResponse {
                error: format!("Unknown run state: {}", value),
            }),
        )
    })
}

/// Query the activity log
pub async fn query_activity(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ActivityQueryParams>,
) -> Result<Json<ActivityQueryResponse>, ActivityError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    // Shared between query and count
    let mut base_filter = ActivityFilter::new();

    if let Some(ref run_id) = params.run_id {
        base_filter = base_filter.with_run_id(run_id);
    }

    if let Some(ref workspace_id) = params.workspace_id {
        base_filter = base_filter.with_workspace_id(workspace_id);
    }

    if let Some(ref from_state) = params.from_state {
        base_filter = base_filter.with_from_state(parse_state(from_state)?);
    }

    if let Some(ref to_state) = params.to_state {
        base_filter = base_filter.with_to_state(parse_state(to_state)?);
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = ActivityFilter {
        limit,
        offset,
        ..base_filter.clone()
    };

    let entries = match state.coordinator().activity(&query_filter) {
        Ok(entries) => entries,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActivityErrorResponse {
                    error: format!("Failed to query activity: {}", e),
                }),
            ));
        }
    };

    let total = match state.coordinator().count_activity(&base_filter) {
        Ok(count) => count,
        Err(e) => {
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ActivityErrorResponse {
                    error: format!("Failed to count activity: {}", e),
                }),
            ));
        }
    };

    Ok(Json(ActivityQueryResponse {
        entries,
        total,
        limit,
        offset,
    }))
}
