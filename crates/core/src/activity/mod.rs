//! Activity trail: append-only record of every run state transition.

mod recorder;
mod sqlite;
mod store;
mod types;

pub use recorder::{ActivityRecorder, RecordError};
pub use sqlite::SqliteActivityLog;
pub use store::{ActivityFilter, ActivityLog};
pub use types::ActivityEntry;
