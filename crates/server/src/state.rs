use std::sync::Arc;
use steward_core::{Authenticator, Config, Coordinator, MonitoringLoop, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    coordinator: Arc<Coordinator>,
    monitor: Arc<MonitoringLoop>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        coordinator: Arc<Coordinator>,
        monitor: Arc<MonitoringLoop>,
    ) -> Self {
        Self {
            config,
            authenticator,
            coordinator,
            monitor,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &Arc<MonitoringLoop> {
        &self.monitor
    }
}
