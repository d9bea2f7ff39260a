use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::adapter::GroupDescriptor;
use crate::auth::Role;
use crate::workspace::ResourceQuota;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Empty means the builtin stub groups.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub workspaces: Vec<WorkspaceConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Keys accepted when `method = "api_key"`.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    #[serde(default)]
    pub role: Role,
}

/// Database configuration. Run snapshots and the activity log share the file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("steward.db")
}

/// Run-level defaults, overridable per workspace.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CoordinatorConfig {
    /// Run deadline, measured from the start of coordination.
    #[serde(default = "default_run_timeout_ms")]
    pub run_timeout_ms: u64,
    /// Per-group execute timeout. Defaults to the run timeout.
    #[serde(default)]
    pub task_timeout_ms: Option<u64>,
    #[serde(default = "default_compensation_timeout_ms")]
    pub compensation_timeout_ms: u64,
    #[serde(default = "default_min_success_ratio")]
    pub min_success_ratio: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            run_timeout_ms: default_run_timeout_ms(),
            task_timeout_ms: None,
            compensation_timeout_ms: default_compensation_timeout_ms(),
            min_success_ratio: default_min_success_ratio(),
        }
    }
}

fn default_run_timeout_ms() -> u64 {
    300_000
}

fn default_compensation_timeout_ms() -> u64 {
    60_000
}

fn default_min_success_ratio() -> f64 {
    1.0
}

/// Monitoring loop configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How often due workspaces are checked.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Runs kept per workspace for rolling statistics.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Alert when the rolling mean success ratio drops below this.
    #[serde(default = "default_min_window_success_ratio")]
    pub min_window_success_ratio: f64,
    /// Alert when a run takes longer than p95 times this factor.
    #[serde(default = "default_duration_alert_factor")]
    pub duration_alert_factor: f64,
    /// Runs needed in the window before either threshold is checked.
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_ms: default_tick_interval_ms(),
            window_size: default_window_size(),
            min_window_success_ratio: default_min_window_success_ratio(),
            duration_alert_factor: default_duration_alert_factor(),
            min_baseline_samples: default_min_baseline_samples(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_window_size() -> usize {
    20
}

fn default_min_window_success_ratio() -> f64 {
    0.9
}

fn default_duration_alert_factor() -> f64 {
    2.0
}

fn default_min_baseline_samples() -> usize {
    5
}

/// Notifier configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NotifierConfig {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Required when `kind = "webhook"`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_notifier_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            url: None,
            timeout_secs: default_notifier_timeout(),
        }
    }
}

fn default_notifier_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

/// One governance group.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GroupConfig {
    pub id: String,
    #[serde(default)]
    pub kind: GroupKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_true")]
    pub undo_supported: bool,
    /// Base URL for `http` groups.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// HTTP client timeout for `http` groups.
    #[serde(default = "default_group_timeout")]
    pub timeout_secs: u64,
    /// Simulated latency for `stub` groups.
    #[serde(default)]
    pub latency_ms: u64,
    /// Make a `stub` group fail every execute.
    #[serde(default)]
    pub fail: bool,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            kind: GroupKind::default(),
            required: false,
            undo_supported: true,
            endpoint: None,
            timeout_secs: default_group_timeout(),
            latency_ms: 0,
            fail: false,
        }
    }
}

impl GroupConfig {
    pub fn descriptor(&self) -> GroupDescriptor {
        GroupDescriptor {
            group_id: self.id.clone(),
            required: self.required,
            undo_supported: self.undo_supported,
        }
    }
}

fn default_group_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    #[default]
    Stub,
    Http,
}

/// One governed workspace.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WorkspaceConfig {
    pub id: String,
    /// Seconds between scheduled runs. 0 means manual runs only.
    #[serde(default)]
    pub schedule_interval_secs: u64,
    #[serde(default)]
    pub min_success_ratio: Option<f64>,
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
    #[serde(default)]
    pub task_timeout_ms: Option<u64>,
    /// Groups fanned out to. Empty means every registered group.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Groups that must succeed in this workspace, on top of globally required ones.
    #[serde(default)]
    pub required_groups: Vec<String>,
    /// 0 means unlimited.
    #[serde(default)]
    pub max_runs_per_hour: u32,
    #[serde(default)]
    pub input: Value,
}

impl WorkspaceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schedule_interval_secs: 0,
            min_success_ratio: None,
            run_timeout_ms: None,
            task_timeout_ms: None,
            groups: Vec::new(),
            required_groups: Vec::new(),
            max_runs_per_hour: 0,
            input: Value::Null,
        }
    }

    pub fn quota(&self) -> ResourceQuota {
        ResourceQuota {
            max_runs_per_hour: (self.max_runs_per_hour > 0).then_some(self.max_runs_per_hour),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule_interval_secs > 0
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub coordinator: CoordinatorConfig,
    pub monitor: MonitorConfig,
    pub notifier: SanitizedNotifierConfig,
    pub groups: Vec<GroupConfig>,
    pub workspaces: Vec<WorkspaceConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_keys_configured: usize,
}

/// Sanitized notifier config (webhook URL hidden, it may embed a token)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifierConfig {
    pub kind: NotifierKind,
    pub url_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_keys_configured: config.auth.api_keys.len(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            coordinator: config.coordinator.clone(),
            monitor: config.monitor.clone(),
            notifier: SanitizedNotifierConfig {
                kind: config.notifier.kind,
                url_configured: config.notifier.url.is_some(),
                timeout_secs: config.notifier.timeout_secs,
            },
            groups: config.groups.clone(),
            workspaces: config.workspaces.clone(),
        }
    }
}
