use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::middleware::{auth_middleware, metrics_middleware};
use super::{activity, handlers, monitor, runs};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Open to everyone, health checks and scrapers carry no credentials
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::get_metrics));

    let protected_routes = Router::new()
        .route("/config", get(handlers::get_config))
        .route("/status", get(monitor::get_status))
        // Runs
        .route("/workspaces/{id}/runs", post(runs::start_run))
        .route("/runs", get(runs::list_runs))
        .route("/runs/{id}", get(runs::get_run))
        .route("/runs/{id}/cancel", post(runs::cancel_run))
        // Activity log
        .route("/activity", get(activity::query_activity))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api_routes = public_routes.merge(protected_routes).with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(metrics_middleware)),
        )
}
