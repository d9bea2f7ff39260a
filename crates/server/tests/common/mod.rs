//! Common test utilities for API testing with mock groups.
//!
//! This module provides a test fixture that builds the full router in
//! process, with mock group adapters and a recording notifier injected,
//! so runs can be driven end to end without any external service.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use steward_core::{
    adapter::AdapterRegistry,
    config::{ApiKeyConfig, AuthConfig, AuthMethod, DatabaseConfig, WorkspaceConfig},
    create_authenticator,
    testing::{MockGroupAdapter, RecordingNotifier},
    Authenticator, Config, Coordinator, MonitoringLoop, Role, SqliteActivityLog, SqliteRunStore,
};
use steward_server::{create_router, AppState};

/// Key accepted with the operator role when the fixture uses API key auth.
pub const OPERATOR_KEY: &str = "operator-secret";
/// Key accepted with the viewer role when the fixture uses API key auth.
pub const VIEWER_KEY: &str = "viewer-secret";

/// In-process server with mock groups.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_commit() {
///     let fixture = TestFixture::new(
///         vec![WorkspaceConfig::new("ws-1")],
///         vec![MockGroupAdapter::new("catalog")],
///     );
///
///     let response = fixture.post("/api/v1/workspaces/ws-1/runs").await;
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    /// Receives every run outcome and alert
    pub notifier: RecordingNotifier,
    /// Holds the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Fixture with auth disabled.
    pub fn new(workspaces: Vec<WorkspaceConfig>, adapters: Vec<MockGroupAdapter>) -> Self {
        Self::build(
            AuthConfig {
                method: AuthMethod::None,
                api_keys: vec![],
            },
            workspaces,
            adapters,
        )
    }

    /// Fixture requiring [`OPERATOR_KEY`] or [`VIEWER_KEY`].
    pub fn with_api_keys(workspaces: Vec<WorkspaceConfig>, adapters: Vec<MockGroupAdapter>) -> Self {
        Self::build(
            AuthConfig {
                method: AuthMethod::ApiKey,
                api_keys: vec![
                    ApiKeyConfig {
                        key: OPERATOR_KEY.to_string(),
                        role: Role::Operator,
                    },
                    ApiKeyConfig {
                        key: VIEWER_KEY.to_string(),
                        role: Role::Viewer,
                    },
                ],
            },
            workspaces,
            adapters,
        )
    }

    fn build(
        auth: AuthConfig,
        workspaces: Vec<WorkspaceConfig>,
        adapters: Vec<MockGroupAdapter>,
    ) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("steward.db");

        let mut registry = AdapterRegistry::new();
        for adapter in adapters {
            registry
                .register(Arc::new(adapter))
                .expect("Failed to register mock group");
        }

        let config = Config {
            auth,
            server: Default::default(),
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            coordinator: Default::default(),
            monitor: Default::default(),
            notifier: Default::default(),
            groups: Vec::new(),
            workspaces,
        };

        let authenticator: Arc<dyn Authenticator> = Arc::from(
            create_authenticator(&config.auth).expect("Failed to create authenticator"),
        );
        let notifier = RecordingNotifier::new();
        let coordinator = Arc::new(
            Coordinator::new(
                &config.workspaces,
                &config.coordinator,
                Arc::new(registry),
                Arc::new(SqliteRunStore::new(&db_path).expect("Failed to create run store")),
                Arc::new(
                    SqliteActivityLog::new(&db_path).expect("Failed to create activity log"),
                ),
            )
            .expect("Failed to build coordinator")
            .with_notifier(Arc::new(notifier.clone())),
        );
        let monitor = Arc::new(MonitoringLoop::new(
            Arc::clone(&coordinator),
            Arc::new(notifier.clone()),
            config.monitor.clone(),
        ));

        let state = Arc::new(AppState::new(config, authenticator, coordinator, monitor));
        let router = create_router(Arc::clone(&state));

        Self {
            router,
            state,
            notifier,
            temp_dir,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str) -> TestResponse {
        self.request(Method::POST, path, None).await
    }

    /// Send a request, with `key` as a bearer token when given.
    pub async fn request(&self, method: Method, path: &str, key: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        let request = builder.body(Body::empty()).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    /// Polls `GET /runs/{id}` until the run has a terminal status.
    pub async fn wait_for_run(&self, run_id: &str) -> TestResponse {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/runs/{}", run_id)).await;
            if response.body["status"].is_string() && response.body["state"] == "idle" {
                return response;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish", run_id);
    }
}

/// Workspace with a per-workspace override of the run deadline.
pub fn workspace_with_deadline(id: &str, run_timeout_ms: u64) -> WorkspaceConfig {
    let mut ws = WorkspaceConfig::new(id);
    ws.run_timeout_ms = Some(run_timeout_ms);
    ws
}

/// Workspace limited to `max_runs_per_hour` starts.
pub fn workspace_with_quota(id: &str, max_runs_per_hour: u32) -> WorkspaceConfig {
    let mut ws = WorkspaceConfig::new(id);
    ws.max_runs_per_hour = max_runs_per_hour;
    ws
}
