use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::{GroupAdapter, GroupDescriptor, HttpGroupAdapter, RegistryError, StubAdapter};
use crate::config::{GroupConfig, GroupKind};

/// Group ids registered as stubs when no `[[groups]]` are configured.
pub const BUILTIN_GROUPS: [&str; 7] = [
    "connectivity",
    "compliance",
    "classification",
    "rule_sets",
    "catalog",
    "scanning",
    "access_control",
];

/// Static table of adapters keyed by group id.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Arc<dyn GroupAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its described group id.
    pub fn register(&mut self, adapter: Arc<dyn GroupAdapter>) -> Result<(), RegistryError> {
        let group_id = adapter.describe().group_id;
        if self.adapters.contains_key(&group_id) {
            return Err(RegistryError::Duplicate(group_id));
        }
        self.adapters.insert(group_id, adapter);
        Ok(())
    }

    /// One stub adapter per builtin group, all optional and undoable.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for id in BUILTIN_GROUPS {
            registry
                .adapters
                .insert(id.to_string(), Arc::new(StubAdapter::new(GroupDescriptor::new(id))));
        }
        registry
    }

    /// Builds the registry from `[[groups]]`, falling back to [`Self::builtin`]
    /// when the list is empty.
    pub fn from_config(groups: &[GroupConfig]) -> Result<Self, RegistryError> {
        if groups.is_empty() {
            info!(groups = BUILTIN_GROUPS.len(), "No groups configured, using builtin stubs");
            return Ok(Self::builtin());
        }

        let mut registry = Self::new();
        for group in groups {
            let adapter: Arc<dyn GroupAdapter> = match group.kind {
                GroupKind::Stub => Arc::new(StubAdapter::from_config(group)),
                GroupKind::Http => Arc::new(HttpGroupAdapter::from_config(group)?),
            };
            registry.register(adapter)?;
        }
        info!(groups = registry.len(), "Group adapters registered");
        Ok(registry)
    }

    pub fn get(&self, group_id: &str) -> Option<Arc<dyn GroupAdapter>> {
        self.adapters.get(group_id).cloned()
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.adapters.contains_key(group_id)
    }

    /// Descriptors in group id order.
    pub fn descriptors(&self) -> Vec<GroupDescriptor> {
        self.adapters.values().map(|a| a.describe()).collect()
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("groups", &self.group_ids())
            .finish()
    }
}
