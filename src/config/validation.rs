use std::net::SocketAddr;

use crate::config::models::{
    BreakerPolicy, CircuitBreakerConfig, GatewayConfig, HealthCheckConfig, ProxyConfig,
    ServiceEntry,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

impl ValidationError {
    fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Gateway configuration validator. Collects every problem before failing.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        errors.extend(Self::validate_routes(config));

        for (i, entry) in config.services.iter().enumerate() {
            errors.extend(Self::validate_service_entry(i, entry));
        }

        errors.extend(Self::validate_health_check_config(&config.health_check));
        errors.extend(Self::validate_circuit_breaker_config(
            &config.circuit_breaker,
        ));
        errors.extend(Self::validate_proxy_config(&config.proxy));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_routes(config: &GatewayConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.routes.is_empty() && config.service_prefix.is_none() {
            errors.push(ValidationError::field(
                "routes",
                "At least one route or a service_prefix is required",
            ));
        }

        for (prefix, service) in &config.routes {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::field(
                    format!("routes.{prefix}"),
                    "Route prefixes must start with '/'",
                ));
            }
            if service.trim().is_empty() {
                errors.push(ValidationError::field(
                    format!("routes.{prefix}"),
                    "Service name cannot be empty",
                ));
            }
        }

        if let Some(prefix) = &config.service_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::field(
                    "service_prefix",
                    "Must start with '/'",
                ));
            }
            if let Some(shadowed) = config
                .routes
                .keys()
                .find(|route| prefix.trim_end_matches('/') == route.trim_end_matches('/'))
            {
                errors.push(ValidationError::RouteConflict {
                    message: format!(
                        "Route '{shadowed}' is identical to service_prefix and hides every service below it"
                    ),
                });
            }
        }

        errors
    }

    fn validate_service_entry(index: usize, entry: &ServiceEntry) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let field = format!("services[{index}]");

        if entry.name.trim().is_empty() {
            errors.push(ValidationError::field(
                format!("{field}.name"),
                "Cannot be empty",
            ));
        }
        if entry.host.trim().is_empty() {
            errors.push(ValidationError::field(
                format!("{field}.host"),
                "Cannot be empty",
            ));
        }
        if entry.port == 0 {
            errors.push(ValidationError::field(
                format!("{field}.port"),
                "Must be between 1 and 65535",
            ));
        }
        if entry.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            errors.push(ValidationError::field(
                format!("{field}.id"),
                "Cannot be empty when set",
            ));
        }

        errors
    }

    fn validate_health_check_config(config: &HealthCheckConfig) -> Vec<ValidationError> {
        if !config.enabled {
            return Vec::new();
        }

        let mut errors = Vec::new();

        if config.interval_secs == 0 {
            errors.push(ValidationError::field(
                "health_check.interval_secs",
                "Must be greater than 0 when health checks are enabled",
            ));
        }

        if config.timeout_secs == 0 {
            errors.push(ValidationError::field(
                "health_check.timeout_secs",
                "Must be greater than 0 when health checks are enabled",
            ));
        }

        if config.max_retries == 0 {
            errors.push(ValidationError::field(
                "health_check.max_retries",
                "Must be greater than 0 when health checks are enabled",
            ));
        }

        if !config.path.starts_with('/') {
            errors.push(ValidationError::field(
                "health_check.path",
                "Must start with '/'",
            ));
        }

        errors
    }

    fn validate_breaker_policy(field: &str, policy: &BreakerPolicy) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if policy.failure_threshold == 0 {
            errors.push(ValidationError::field(
                format!("{field}.failure_threshold"),
                "Must be greater than 0",
            ));
        }

        if policy.half_open_max_requests == 0 {
            errors.push(ValidationError::field(
                format!("{field}.half_open_max_requests"),
                "Must be greater than 0",
            ));
        }

        errors
    }

    fn validate_circuit_breaker_config(config: &CircuitBreakerConfig) -> Vec<ValidationError> {
        let mut errors = Self::validate_breaker_policy("circuit_breaker", &config.policy());
        for (service, policy) in &config.overrides {
            errors.extend(Self::validate_breaker_policy(
                &format!("circuit_breaker.overrides.{service}"),
                policy,
            ));
        }
        errors
    }

    fn validate_proxy_config(config: &ProxyConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.timeout_secs == 0 {
            errors.push(ValidationError::field(
                "proxy.timeout_secs",
                "Must be greater than 0",
            ));
        }

        for (field, value) in [
            ("proxy.request_id_header", &config.request_id_header),
            ("proxy.service_header", &config.service_header),
        ] {
            if axum::http::HeaderName::try_from(value.as_str()).is_err() {
                errors.push(ValidationError::field(field, "Not a valid HTTP header name"));
            }
        }

        errors
    }

    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> GatewayConfig {
        GatewayConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .route("/calls", "calling-service")
            .service(ServiceEntry {
                id: None,
                name: "calling-service".to_string(),
                host: "127.0.0.1".to_string(),
                port: 9001,
                version: "1.0.0".to_string(),
                tags: vec![],
            })
            .build()
    }

    #[test]
    fn test_valid_config() {
        assert!(GatewayConfigValidator::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_listen_address() {
        let mut config = valid_config();
        config.listen_addr = "invalid".to_string();
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_requires_a_route() {
        let mut config = valid_config();
        config.routes.clear();
        assert!(GatewayConfigValidator::validate(&config).is_err());

        config.service_prefix = Some("/api/v1".to_string());
        assert!(GatewayConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = valid_config();
        config.services[0].port = 0;
        config.services[0].host = " ".to_string();
        config.circuit_breaker.failure_threshold = 0;
        config.proxy.request_id_header = "bad header".to_string();

        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Found 4 validation errors"), "{message}");
        assert!(message.contains("services[0].port"));
        assert!(message.contains("circuit_breaker.failure_threshold"));
        assert!(message.contains("proxy.request_id_header"));
    }

    #[test]
    fn test_disabled_health_check_skips_checks() {
        let mut config = valid_config();
        config.health_check.enabled = false;
        config.health_check.interval_secs = 0;
        assert!(GatewayConfigValidator::validate(&config).is_ok());

        config.health_check.enabled = true;
        assert!(GatewayConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_override_policy_is_validated() {
        let mut config = valid_config();
        config.circuit_breaker.overrides.insert(
            "payments".to_string(),
            BreakerPolicy {
                half_open_max_requests: 0,
                ..BreakerPolicy::default()
            },
        );
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(
            err.to_string()
                .contains("circuit_breaker.overrides.payments.half_open_max_requests")
        );
    }

    #[test]
    fn test_service_prefix_conflict() {
        let mut config = valid_config();
        config.service_prefix = Some("/api/v1/".to_string());
        config
            .routes
            .insert("/api/v1".to_string(), "catch-all".to_string());
        let err = GatewayConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Route conflict"));
    }
}
