//! Task scheduler: concurrent fan-out to groups and deadline-bounded join.

mod error;
mod task_scheduler;

pub use error::TimeoutError;
pub use task_scheduler::{InFlight, TaskScheduler};
