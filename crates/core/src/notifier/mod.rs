//! Outbound notification of run outcomes and monitoring alerts.

mod log_notifier;
mod traits;
mod types;
mod webhook;

pub use log_notifier::LogNotifier;
pub use traits::{Notifier, NotifyError};
pub use types::{Alert, AlertKind, RunOutcomeReport};
pub use webhook::WebhookNotifier;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{NotifierConfig, NotifierKind};

/// Factory function to create a notifier from config
pub fn create_notifier(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier::new())),
        NotifierKind::Webhook => {
            let url = config.url.clone().ok_or_else(|| {
                NotifyError::ConfigurationError(
                    "url must be set when using the webhook notifier".to_string(),
                )
            })?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_log_notifier() {
        let notifier = create_notifier(&NotifierConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log");
    }

    #[test]
    fn test_create_webhook_notifier_requires_url() {
        let config = NotifierConfig {
            kind: NotifierKind::Webhook,
            url: None,
            ..NotifierConfig::default()
        };
        assert!(matches!(
            create_notifier(&config),
            Err(NotifyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_create_webhook_notifier() {
        let config = NotifierConfig {
            kind: NotifierKind::Webhook,
            url: Some("http://localhost:9999/hook".to_string()),
            ..NotifierConfig::default()
        };
        assert_eq!(create_notifier(&config).unwrap().name(), "webhook");
    }
}
