//! Orchestration coordinator.
//!
//! Drives each run through `Idle -> Initializing -> Coordinating ->
//! Evaluating -> Committing | Compensating -> Idle`, with `Errored` on
//! persistence failure, quota exhaustion or restart recovery.

mod plan;
mod runner;
mod types;

pub use plan::WorkspacePlan;
pub use runner::Coordinator;
pub use types::*;
