//! Spawns the `steward` binary and drives it with its own client commands.

use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

/// Find an available port
fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Config with a fast workspace, a slow one, one with a short deadline and
/// one whose id is not URL-safe
fn test_config(port: u16, db_dir: &Path) -> String {
    format!(
        r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = {port}

[database]
path = "{db}"

[monitor]
enabled = false

[[groups]]
id = "catalog"

[[groups]]
id = "scanning"
latency_ms = 2000

[[workspaces]]
id = "fast"
groups = ["catalog"]

[[workspaces]]
id = "slow"

[[workspaces]]
id = "tight"
run_timeout_ms = 200

[[workspaces]]
id = "eu/prod#2"
groups = ["catalog"]
"#,
        port = port,
        db = db_dir.join("steward.db").display()
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

/// Spawn the server and return a handle
async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_steward"))
        .arg("serve")
        .env("STEWARD_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

/// Wait for server to be ready
async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Run a client subcommand against the server on `port`.
async fn steward(port: u16, args: &[&str]) -> std::process::Output {
    timeout(
        Duration::from_secs(10),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_steward"))
            .args(args)
            .arg("--server")
            .arg(format!("http://127.0.0.1:{}", port))
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command")
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[tokio::test]
async fn test_health_and_config_endpoints() {
    let port = get_available_port();
    let db_dir = TempDir::new().unwrap();
    let config = write_config(&test_config(port, db_dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    let client = Client::new();
    let health: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(health["status"], "ok");

    let config: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(config["auth"]["method"], "none");
    assert_eq!(config["server"]["port"], port);
    assert_eq!(config["workspaces"].as_array().unwrap().len(), 4);

    server.kill().await.ok();
}

#[tokio::test]
async fn test_cli_exit_codes() {
    let port = get_available_port();
    let db_dir = TempDir::new().unwrap();
    let config = write_config(&test_config(port, db_dir.path()));

    let mut server = spawn_server(config.path()).await;
    assert!(
        wait_for_server(port, 40).await,
        "Server did not start in time"
    );

    // Success
    let output = steward(port, &["start-run", "fast"]).await;
    assert_eq!(output.status.code(), Some(0));
    let run = stdout_json(&output);
    assert_eq!(run["status"], "committed");

    let run_id = run["run_id"].as_str().unwrap();
    let output = steward(port, &["get-run-status", run_id]).await;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["groups"][0]["group_id"], "catalog");

    // Ids travel as single path segments
    let output = steward(port, &["start-run", "eu/prod#2"]).await;
    assert_eq!(output.status.code(), Some(0));
    let run = stdout_json(&output);
    assert_eq!(run["workspace_id"], "eu/prod#2");

    // Workspace locked
    let output = steward(port, &["start-run", "slow", "--no-wait"]).await;
    assert_eq!(output.status.code(), Some(0));
    let output = steward(port, &["start-run", "slow"]).await;
    assert_eq!(output.status.code(), Some(1));

    // Run timed out
    let output = steward(port, &["start-run", "tight"]).await;
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout_json(&output)["join"]["deadline_hit"], true);

    // Any other error
    let output = steward(port, &["cancel-run", "does-not-exist"]).await;
    assert_eq!(output.status.code(), Some(2));
    let output = steward(port, &["start-run", "unknown-workspace"]).await;
    assert_eq!(output.status.code(), Some(2));

    server.kill().await.ok();
}

#[tokio::test]
async fn test_client_without_server_exits_with_error() {
    let port = get_available_port();
    let output = steward(port, &["get-run-status", "some-run"]).await;
    assert_eq!(output.status.code(), Some(2));
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_steward"))
            .env("STEWARD_CONFIG", "/nonexistent/steward.toml")
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_missing_auth_section_exits_with_error() {
    let config_without_auth = r#"
[server]
port = 8080
"#;
    let temp_file = write_config(config_without_auth);

    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_steward"))
            .env("STEWARD_CONFIG", temp_file.path())
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}
