//! Group adapter that forwards calls to a remote domain service over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::types::{ExecuteRequest, UndoRequest, UndoResponse};
use super::{
    AdapterError, ExecutionContext, GroupAdapter, GroupDescriptor, RegistryError, UndoOutcome,
};
use crate::config::GroupConfig;

/// Remote group reached at `POST {endpoint}/execute` and `POST {endpoint}/undo`.
pub struct HttpGroupAdapter {
    client: Client,
    descriptor: GroupDescriptor,
    endpoint: String,
}

impl HttpGroupAdapter {
    pub fn new(
        descriptor: GroupDescriptor,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistryError::InvalidConfig {
                group_id: descriptor.group_id.clone(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            descriptor,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &GroupConfig) -> Result<Self, RegistryError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| RegistryError::InvalidConfig {
                group_id: config.id.clone(),
                message: "http groups need an endpoint".to_string(),
            })?;
        Self::new(
            config.descriptor(),
            endpoint,
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> AdapterError {
        let group_id = self.descriptor.group_id.clone();
        if e.is_connect() || e.is_timeout() {
            AdapterError::Unavailable {
                group_id,
                message: e.to_string(),
            }
        } else {
            AdapterError::Failed {
                group_id,
                message: e.to_string(),
            }
        }
    }

    async fn post<B: serde::Serialize + Sync>(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, AdapterError> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!(group = %self.descriptor.group_id, url = %url, "Calling remote group");

        let send = self.client.post(&url).json(body).send();
        let response = tokio::select! {
            r = send => r.map_err(|e| self.map_send_error(e))?,
            _ = ctx.cancel.cancelled() => {
                return Err(AdapterError::Cancelled(self.descriptor.group_id.clone()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        );
        let group_id = self.descriptor.group_id.clone();
        Err(match status {
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
                AdapterError::Unavailable { group_id, message }
            }
            _ => AdapterError::Failed { group_id, message },
        })
    }
}

#[async_trait]
impl GroupAdapter for HttpGroupAdapter {
    fn describe(&self) -> GroupDescriptor {
        self.descriptor.clone()
    }

    async fn execute(&self, ctx: &ExecutionContext, input: &Value) -> Result<Value, AdapterError> {
        let request = ExecuteRequest {
            run_id: ctx.run_id.clone(),
            workspace_id: ctx.workspace_id.clone(),
            group_id: ctx.group_id.clone(),
            input: input.clone(),
        };
        let response = self.post(ctx, "execute", &request).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| AdapterError::InvalidResponse {
                group_id: self.descriptor.group_id.clone(),
                message: e.to_string(),
            })
    }

    async fn undo(
        &self,
        ctx: &ExecutionContext,
        result: &Value,
    ) -> Result<UndoOutcome, AdapterError> {
        let request = UndoRequest {
            run_id: ctx.run_id.clone(),
            workspace_id: ctx.workspace_id.clone(),
            group_id: ctx.group_id.clone(),
            result: result.clone(),
        };
        let response = self.post(ctx, "undo", &request).await?;
        let body: UndoResponse =
            response
                .json()
                .await
                .map_err(|e| AdapterError::InvalidResponse {
                    group_id: self.descriptor.group_id.clone(),
                    message: e.to_string(),
                })?;
        Ok(body.outcome)
    }
}
