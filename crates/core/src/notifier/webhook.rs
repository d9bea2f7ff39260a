//! Webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{Alert, Notifier, NotifyError, RunOutcomeReport};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WebhookBody<'a> {
    RunOutcome(&'a RunOutcomeReport),
    Alert(&'a Alert),
}

/// Posts JSON bodies tagged `"type": "run_outcome"` or `"type": "alert"` to a URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::ConfigurationError(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, body: &WebhookBody<'_>) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        debug!(url = %self.url, "Webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn report_run_outcome(&self, report: &RunOutcomeReport) -> Result<(), NotifyError> {
        self.post(&WebhookBody::RunOutcome(report)).await
    }

    async fn raise_alert(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.post(&WebhookBody::Alert(alert)).await
    }

    fn name(&self) -> &'static str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::AlertKind;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    async fn spawn_sink(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(store): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                        store.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}/hook", addr), received)
    }

    #[tokio::test]
    async fn test_alert_is_posted_with_type_tag() {
        let (url, received) = spawn_sink(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();

        let alert = Alert::new(AlertKind::RunErrored, "ws-a", "run-1", "run errored");
        notifier.raise_alert(&alert).await.unwrap();

        let bodies = received.lock().unwrap().clone();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["type"], "alert");
        assert_eq!(bodies[0]["kind"], "run_errored");
        assert_eq!(bodies[0]["workspace_id"], "ws-a");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (url, _received) = spawn_sink(StatusCode::BAD_GATEWAY).await;
        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();

        let alert = Alert::new(AlertKind::DurationAboveBaseline, "ws-a", "run-1", "slow");
        let err = notifier.raise_alert(&alert).await.unwrap_err();
        assert_eq!(err, NotifyError::Rejected(502));
    }

    #[tokio::test]
    async fn test_unreachable_url_is_delivery_error() {
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:1/hook", Duration::from_secs(2)).unwrap();
        let alert = Alert::new(AlertKind::RunErrored, "ws-a", "run-1", "x");
        assert!(matches!(
            notifier.raise_alert(&alert).await,
            Err(NotifyError::Delivery(_))
        ));
    }
}
