//! Workspace-scoped shared resources: the one-run-per-workspace lock and run quotas.

mod locks;
mod quota;

pub use locks::{LockContentionError, WorkspaceLease, WorkspaceLocks};
pub use quota::{QuotaError, QuotaTracker, ResourceQuota};
