use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::GatewayConfig;

/// Prefix of environment variables overriding file values, e.g.
/// `MERIDIAN__PROXY__TIMEOUT_SECS=10`.
pub const ENV_PREFIX: &str = "MERIDIAN";

/// Load configuration from a file using the config crate.
/// Supports TOML, YAML and JSON, chosen by extension (TOML when unknown).
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::config::LoadBalanceStrategy;

    #[tokio::test]
    async fn test_load_toml_config() {
        let toml_content = r#"
listen_addr = "127.0.0.1:3000"
service_prefix = "/api/v1"

[health_check]
interval_secs = 10
max_retries = 2

[circuit_breaker]
failure_threshold = 4

[circuit_breaker.overrides.payments]
failure_threshold = 1

[routes]
"/calls" = "calling-service"

[[services]]
name = "calling-service"
host = "127.0.0.1"
port = 9001
version = "1.4.0"
tags = ["primary"]
"#;

        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "{}", toml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.health_check.interval_secs, 10);
        assert_eq!(config.health_check.max_retries, 2);
        assert_eq!(config.health_check.timeout_secs, 5);
        assert_eq!(config.circuit_breaker.failure_threshold, 4);
        assert_eq!(
            config.circuit_breaker.overrides["payments"].failure_threshold,
            1
        );
        assert_eq!(config.routes["/calls"], "calling-service");
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].tags, vec!["primary".to_string()]);
    }

    #[tokio::test]
    async fn test_load_yaml_config() {
        let yaml_content = r#"
listen_addr: "127.0.0.1:3000"
proxy:
  timeout_secs: 10
  load_balance: random
routes:
  "/api/v1/auth": "auth-service"
"#;

        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = load_config(temp_file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(config.proxy.timeout_secs, 10);
        assert_eq!(config.proxy.load_balance, LoadBalanceStrategy::Random);
        assert_eq!(config.routes.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        assert!(load_config("/nonexistent/meridian.toml").await.is_err());
    }
}
