//! Run context, task and record types, plus their durable store.

mod cancel;
mod sqlite_store;
mod store;
mod types;

pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use sqlite_store::SqliteRunStore;
pub use store::{RunFilter, RunStore};
pub use types::{
    CompensationOutcome, CompensationRecord, GateDecision, GateVerdict, GroupTask, JoinResult,
    RunConfigSnapshot, RunContext, RunRecord, RunState, RunTrigger, TaskState, TerminalStatus,
};
