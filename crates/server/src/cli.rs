//! HTTP client behind the `start-run`, `get-run-status` and `cancel-run`
//! subcommands.

use anyhow::{Context, Result};
use serde_json::Value;

/// Process exit codes of the client subcommands.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const WORKSPACE_LOCKED: i32 = 1;
    pub const ERROR: i32 = 2;
    pub const TIMED_OUT: i32 = 3;
}

/// Exit code for an API response status.
pub fn exit_code_for(status: u16) -> i32 {
    match status {
        200..=299 => exit_code::SUCCESS,
        409 => exit_code::WORKSPACE_LOCKED,
        504 => exit_code::TIMED_OUT,
        _ => exit_code::ERROR,
    }
}

/// Status and body of one API call.
#[derive(Debug, Clone)]
pub struct ApiReply {
    pub status: u16,
    /// JSON body, or the raw text as a string when it is not JSON.
    pub body: Value,
}

impl ApiReply {
    pub fn exit_code(&self) -> i32 {
        exit_code_for(self.status)
    }
}

/// Client for a running `steward serve`.
pub struct ApiClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            api_key,
            http: reqwest::Client::new(),
        }
    }

    /// Starts a manual run. With `wait` the call returns once the run is
    /// back to idle.
    pub async fn start_run(&self, workspace_id: &str, wait: bool) -> Result<ApiReply> {
        let url = self.url(&["workspaces", workspace_id, "runs"]);
        self.send(self.http.post(format!("{}?wait={}", url, wait))).await
    }

    pub async fn get_run_status(&self, run_id: &str) -> Result<ApiReply> {
        self.send(self.http.get(self.url(&["runs", run_id]))).await
    }

    pub async fn cancel_run(&self, run_id: &str) -> Result<ApiReply> {
        self.send(self.http.post(self.url(&["runs", run_id, "cancel"]))).await
    }

    /// API URL with every path segment percent-encoded, so ids may contain
    /// `/`, `#`, `?` or spaces.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = format!("{}/api/v1", self.base_url);
        for segment in segments {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiReply> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach steward at {}", self.base_url))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .context("Failed to read response body")?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(ApiReply { status, body })
    }
}
