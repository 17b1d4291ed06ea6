//! Configuration data structures for Meridian.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and
//! carry serde defaults so that a minimal file only needs routes and services.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Path prefix → logical service name
    #[serde(default)]
    pub routes: HashMap<String, String>,
    /// Prefix under which the first path segment names the service, e.g. `/api/v1`
    #[serde(default)]
    pub service_prefix: Option<String>,
    /// Instances registered at startup
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl GatewayConfig {
    /// Create a new server configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            routes: HashMap::new(),
            service_prefix: None,
            services: Vec::new(),
            health_check: HealthCheckConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// A statically configured service instance.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    /// Fixed instance id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    /// Consecutive failed probes before an instance is marked unhealthy
    pub max_retries: u32,
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            max_retries: 3,
            path: "/health".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Thresholds of a single circuit breaker.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub half_open_max_requests: u32,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 30,
            half_open_max_requests: 3,
        }
    }
}

impl BreakerPolicy {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_secs: u64,
    pub half_open_max_requests: u32,
    /// Per-service policies replacing the defaults above
    pub overrides: HashMap<String, BreakerPolicy>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        let policy = BreakerPolicy::default();
        Self {
            failure_threshold: policy.failure_threshold,
            reset_timeout_secs: policy.reset_timeout_secs,
            half_open_max_requests: policy.half_open_max_requests,
            overrides: HashMap::new(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Default policy applied to services without an override
    pub fn policy(&self) -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: self.failure_threshold,
            reset_timeout_secs: self.reset_timeout_secs,
            half_open_max_requests: self.half_open_max_requests,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    pub timeout_secs: u64,
    /// Correlation header injected upstream and echoed to the caller
    pub request_id_header: String,
    /// Header naming the logical service that handled the request
    pub service_header: String,
    pub load_balance: LoadBalanceStrategy,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            request_id_header: "x-request-id".to_string(),
            service_header: "x-gateway-service".to_string(),
            load_balance: LoadBalanceStrategy::RoundRobin,
        }
    }
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    RoundRobin,
    Random,
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Route requests under `prefix` to `service`
    pub fn route(mut self, prefix: impl Into<String>, service: impl Into<String>) -> Self {
        self.config.routes.insert(prefix.into(), service.into());
        self
    }

    pub fn service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.service_prefix = Some(prefix.into());
        self
    }

    pub fn service(mut self, entry: ServiceEntry) -> Self {
        self.config.services.push(entry);
        self
    }

    pub fn health_check(mut self, config: HealthCheckConfig) -> Self {
        self.config.health_check = config;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    pub fn proxy(mut self, config: ProxyConfig) -> Self {
        self.config.proxy = config;
        self
    }

    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.health_check.interval(), Duration::from_secs(30));
        assert_eq!(config.health_check.timeout(), Duration::from_secs(5));
        assert_eq!(config.health_check.max_retries, 3);
        assert_eq!(config.circuit_breaker.policy(), BreakerPolicy::default());
        assert_eq!(config.proxy.timeout(), Duration::from_secs(30));
        assert_eq!(config.proxy.load_balance, LoadBalanceStrategy::RoundRobin);
    }

    #[test]
    fn test_builder() {
        let config = GatewayConfig::builder()
            .listen_addr("0.0.0.0:9000")
            .route("/api/v1/auth", "auth-service")
            .service_prefix("/api/v1")
            .build();
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.routes["/api/v1/auth"], "auth-service");
        assert_eq!(config.service_prefix.as_deref(), Some("/api/v1"));
    }

    #[test]
    fn test_minimal_json() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"routes": {"/calls": "calling-service"}, "proxy": {"load_balance": "random"}}"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.proxy.load_balance, LoadBalanceStrategy::Random);
        assert_eq!(config.proxy.request_id_header, "x-request-id");
    }
}
