//! Coordinator and monitoring loop status.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use steward_core::coordinator::CoordinatorStatus;
use steward_core::MonitorStatus;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub coordinator: CoordinatorStatus,
    pub monitor: MonitorStatus,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        coordinator: state.coordinator().status(),
        monitor: state.monitor().status(),
    })
}
