use std::time::Duration;

use serde_json::Value;

use super::CoordinatorError;
use crate::adapter::{AdapterRegistry, GroupDescriptor};
use crate::config::{CoordinatorConfig, WorkspaceConfig};
use crate::run::RunConfigSnapshot;
use crate::workspace::ResourceQuota;

/// A workspace's configuration resolved against the registry and the
/// coordinator defaults. Every run of the workspace snapshots it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspacePlan {
    pub workspace_id: String,
    /// Groups in id order, with workspace-level required flags merged in.
    pub groups: Vec<GroupDescriptor>,
    pub min_success_ratio: f64,
    pub run_timeout_ms: u64,
    pub task_timeout_ms: u64,
    pub compensation_timeout_ms: u64,
    pub quota: ResourceQuota,
    pub input: Value,
    /// `None` for workspaces that only run on demand.
    pub schedule_interval: Option<Duration>,
}

impl WorkspacePlan {
    pub fn resolve(
        workspace: &WorkspaceConfig,
        defaults: &CoordinatorConfig,
        registry: &AdapterRegistry,
    ) -> Result<Self, CoordinatorError> {
        let unknown = |group_id: &str| CoordinatorError::UnknownGroup {
            workspace_id: workspace.id.clone(),
            group_id: group_id.to_string(),
        };

        let all = registry.descriptors();
        let mut groups: Vec<GroupDescriptor> = if workspace.groups.is_empty() {
            all
        } else {
            let mut selected = Vec::with_capacity(workspace.groups.len());
            for id in &workspace.groups {
                let descriptor = all
                    .iter()
                    .find(|d| &d.group_id == id)
                    .ok_or_else(|| unknown(id))?;
                selected.push(descriptor.clone());
            }
            selected.sort_by(|a, b| a.group_id.cmp(&b.group_id));
            selected.dedup_by(|a, b| a.group_id == b.group_id);
            selected
        };

        for id in &workspace.required_groups {
            let descriptor = groups
                .iter_mut()
                .find(|d| &d.group_id == id)
                .ok_or_else(|| unknown(id))?;
            descriptor.required = true;
        }

        let run_timeout_ms = workspace.run_timeout_ms.unwrap_or(defaults.run_timeout_ms);
        let task_timeout_ms = workspace
            .task_timeout_ms
            .or(defaults.task_timeout_ms)
            .unwrap_or(run_timeout_ms);

        Ok(Self {
            workspace_id: workspace.id.clone(),
            groups,
            min_success_ratio: workspace
                .min_success_ratio
                .unwrap_or(defaults.min_success_ratio),
            run_timeout_ms,
            task_timeout_ms,
            compensation_timeout_ms: defaults.compensation_timeout_ms,
            quota: workspace.quota(),
            input: workspace.input.clone(),
            schedule_interval: workspace
                .is_scheduled()
                .then(|| Duration::from_secs(workspace.schedule_interval_secs)),
        })
    }

    /// Configuration pinned into a new run.
    pub fn snapshot(&self) -> RunConfigSnapshot {
        RunConfigSnapshot {
            groups: self.groups.clone(),
            min_success_ratio: self.min_success_ratio,
            run_timeout_ms: self.run_timeout_ms,
            task_timeout_ms: self.task_timeout_ms,
            compensation_timeout_ms: self.compensation_timeout_ms,
            input: self.input.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(plan: &WorkspacePlan) -> Vec<&str> {
        plan.groups.iter().map(|d| d.group_id.as_str()).collect()
    }

    #[test]
    fn test_empty_group_list_selects_every_group() {
        let plan = WorkspacePlan::resolve(
            &WorkspaceConfig::new("ws-1"),
            &CoordinatorConfig::default(),
            &AdapterRegistry::builtin(),
        )
        .unwrap();

        assert_eq!(plan.groups.len(), 7);
        assert!(plan.groups.iter().all(|d| !d.required));
        assert_eq!(plan.min_success_ratio, 1.0);
        assert_eq!(plan.task_timeout_ms, plan.run_timeout_ms);
        assert_eq!(plan.schedule_interval, None);
    }

    #[test]
    fn test_workspace_overrides_and_required_groups() {
        let mut ws = WorkspaceConfig::new("ws-1");
        ws.groups = vec!["scanning".to_string(), "compliance".to_string()];
        ws.required_groups = vec!["compliance".to_string()];
        ws.min_success_ratio = Some(0.5);
        ws.run_timeout_ms = Some(5_000);
        ws.schedule_interval_secs = 60;
        ws.max_runs_per_hour = 4;

        let plan =
            WorkspacePlan::resolve(&ws, &CoordinatorConfig::default(), &AdapterRegistry::builtin())
                .unwrap();

        assert_eq!(ids(&plan), vec!["compliance", "scanning"]);
        assert!(plan.groups[0].required);
        assert!(!plan.groups[1].required);
        assert_eq!(plan.min_success_ratio, 0.5);
        assert_eq!(plan.run_timeout_ms, 5_000);
        assert_eq!(plan.task_timeout_ms, 5_000);
        assert_eq!(plan.schedule_interval, Some(Duration::from_secs(60)));
        assert_eq!(plan.quota.max_runs_per_hour, Some(4));
    }

    #[test]
    fn test_task_timeout_falls_back_to_coordinator_default() {
        let defaults = CoordinatorConfig {
            task_timeout_ms: Some(1_000),
            ..Default::default()
        };
        let plan = WorkspacePlan::resolve(
            &WorkspaceConfig::new("ws-1"),
            &defaults,
            &AdapterRegistry::builtin(),
        )
        .unwrap();
        assert_eq!(plan.task_timeout_ms, 1_000);
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let mut ws = WorkspaceConfig::new("ws-1");
        ws.groups = vec!["billing".to_string()];
        let err =
            WorkspacePlan::resolve(&ws, &CoordinatorConfig::default(), &AdapterRegistry::builtin())
                .unwrap_err();
        assert!(matches!(err, CoordinatorError::UnknownGroup { group_id, .. } if group_id == "billing"));
    }

    #[test]
    fn test_required_group_outside_selection_is_rejected() {
        let mut ws = WorkspaceConfig::new("ws-1");
        ws.groups = vec!["catalog".to_string()];
        ws.required_groups = vec!["scanning".to_string()];
        let result =
            WorkspacePlan::resolve(&ws, &CoordinatorConfig::default(), &AdapterRegistry::builtin());
        assert!(matches!(result, Err(CoordinatorError::UnknownGroup { .. })));
    }
}
