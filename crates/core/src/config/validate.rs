use std::collections::HashSet;

use super::{types::Config, AuthMethod, ConfigError, GroupKind, NotifierKind};
use crate::adapter::BUILTIN_GROUPS;

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_ratio(name: &str, ratio: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&ratio) {
        return Err(invalid(format!("{} must be within [0.0, 1.0], got {}", name, ratio)));
    }
    Ok(())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey && config.auth.api_keys.is_empty() {
        return Err(invalid("auth.api_keys must not be empty when method = \"api_key\""));
    }

    let coordinator = &config.coordinator;
    check_ratio("coordinator.min_success_ratio", coordinator.min_success_ratio)?;
    if coordinator.run_timeout_ms == 0 {
        return Err(invalid("coordinator.run_timeout_ms cannot be 0"));
    }
    if coordinator.task_timeout_ms == Some(0) {
        return Err(invalid("coordinator.task_timeout_ms cannot be 0"));
    }
    if coordinator.compensation_timeout_ms == 0 {
        return Err(invalid("coordinator.compensation_timeout_ms cannot be 0"));
    }

    let monitor = &config.monitor;
    if monitor.tick_interval_ms == 0 {
        return Err(invalid("monitor.tick_interval_ms cannot be 0"));
    }
    if monitor.window_size == 0 {
        return Err(invalid("monitor.window_size cannot be 0"));
    }
    check_ratio("monitor.min_window_success_ratio", monitor.min_window_success_ratio)?;
    if monitor.duration_alert_factor.is_nan() || monitor.duration_alert_factor < 1.0 {
        return Err(invalid("monitor.duration_alert_factor must be at least 1.0"));
    }

    if config.notifier.kind == NotifierKind::Webhook && config.notifier.url.is_none() {
        return Err(invalid("notifier.url must be set when kind = \"webhook\""));
    }

    let mut group_ids = HashSet::new();
    for group in &config.groups {
        if group.id.is_empty() {
            return Err(invalid("groups[].id cannot be empty"));
        }
        if !group_ids.insert(group.id.as_str()) {
            return Err(invalid(format!("duplicate group id: {}", group.id)));
        }
        if group.kind == GroupKind::Http && group.endpoint.is_none() {
            return Err(invalid(format!("group {} is http but has no endpoint", group.id)));
        }
    }
    if config.groups.is_empty() {
        group_ids.extend(BUILTIN_GROUPS);
    }

    let mut workspace_ids = HashSet::new();
    for ws in &config.workspaces {
        if ws.id.is_empty() {
            return Err(invalid("workspaces[].id cannot be empty"));
        }
        if !workspace_ids.insert(ws.id.as_str()) {
            return Err(invalid(format!("duplicate workspace id: {}", ws.id)));
        }
        if let Some(ratio) = ws.min_success_ratio {
            check_ratio(&format!("workspace {} min_success_ratio", ws.id), ratio)?;
        }
        if ws.run_timeout_ms == Some(0) || ws.task_timeout_ms == Some(0) {
            return Err(invalid(format!("workspace {} timeouts cannot be 0", ws.id)));
        }
        for group in ws.groups.iter().chain(&ws.required_groups) {
            if !group_ids.contains(group.as_str()) {
                return Err(invalid(format!(
                    "workspace {} references unknown group {}",
                    ws.id, group
                )));
            }
        }
        if !ws.groups.is_empty() {
            if let Some(missing) = ws.required_groups.iter().find(|g| !ws.groups.contains(g)) {
                return Err(invalid(format!(
                    "workspace {} requires group {} which it does not run",
                    ws.id, missing
                )));
            }
        }
    }

    Ok(())
}
