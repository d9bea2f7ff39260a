pub mod activity;
pub mod adapter;
pub mod auth;
pub mod compensation;
pub mod config;
pub mod coordinator;
pub mod gate;
pub mod metrics;
pub mod monitor;
pub mod notifier;
pub mod persistence;
pub mod run;
pub mod scheduler;
pub mod testing;
pub mod workspace;

pub use activity::{ActivityEntry, ActivityFilter, ActivityLog, SqliteActivityLog};
pub use adapter::{AdapterRegistry, GroupAdapter, GroupDescriptor};
pub use auth::{
    create_authenticator, require_operator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator, Role,
};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use coordinator::{Coordinator, CoordinatorError, RunHandle};
pub use monitor::{MonitorStatus, MonitoringLoop};
pub use notifier::{create_notifier, Notifier};
pub use run::{RunFilter, RunRecord, RunState, RunStore, RunTrigger, SqliteRunStore, TerminalStatus};
