use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("STEWARD_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthMethod, GroupKind, NotifierKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[auth]
method = "none"

[server]
port = 9000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.coordinator.min_success_ratio, 1.0);
        assert_eq!(config.coordinator.run_timeout_ms, 300_000);
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_load_config_from_str_missing_auth() {
        let toml = r#"
[server]
port = 8080
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_full_config() {
        let toml = r#"
[auth]
method = "api_key"

[[auth.api_keys]]
key = "op-key"
role = "operator"

[[auth.api_keys]]
key = "view-key"

[coordinator]
run_timeout_ms = 5000
min_success_ratio = 0.8

[notifier]
kind = "webhook"
url = "http://localhost:9000/hook"

[[groups]]
id = "compliance"
required = true

[[groups]]
id = "scanning"
kind = "http"
endpoint = "http://scanner:8080"

[[workspaces]]
id = "finance"
schedule_interval_secs = 3600
groups = ["compliance", "scanning"]
max_runs_per_hour = 4
input = { scope = "ledger" }
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.auth.api_keys.len(), 2);
        assert_eq!(config.auth.api_keys[1].role, crate::auth::Role::Viewer);
        assert_eq!(config.coordinator.run_timeout_ms, 5000);
        assert_eq!(config.notifier.kind, NotifierKind::Webhook);
        assert_eq!(config.groups[1].kind, GroupKind::Http);
        assert!(config.groups[0].undo_supported);

        let ws = &config.workspaces[0];
        assert_eq!(ws.schedule_interval_secs, 3600);
        assert_eq!(ws.input["scope"], "ledger");
        assert_eq!(ws.quota().max_runs_per_hour, Some(4));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 3000
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }
}
