//! HTTP API and CLI client for the steward coordinator.

pub mod api;
pub mod cli;
pub mod metrics;
pub mod state;

pub use api::create_router;
pub use state::AppState;
