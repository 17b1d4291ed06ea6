use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a registration request is malformed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistrationError {
    /// Service name is empty or whitespace
    #[error("Service name must not be empty")]
    EmptyName,

    /// Host is empty or whitespace
    #[error("Host must not be empty for service '{0}'")]
    EmptyHost(String),

    /// Port 0 cannot be dialled
    #[error("Invalid port {port} for service '{service}'")]
    InvalidPort {
        /// Service the registration was for
        service: String,
        /// Offending port
        port: u16,
    },
}

/// Result type for registration operations
pub type RegistrationResult<T> = Result<T, RegistrationError>;

/// Opaque, globally unique identifier of a registered instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wrap an existing identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for an instance of `service`
    pub fn generate(service: &str) -> Self {
        Self(format!("{service}-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Last known health of an instance as observed by active probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// No probe has completed yet
    #[default]
    Unknown,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// One registered backend endpoint.
///
/// Several instances may share a `name`; the `id` is unique across the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: InstanceId,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub version: String,
    pub tags: BTreeSet<String>,
    pub health: HealthStatus,
    pub last_seen: DateTime<Utc>,
}

impl ServiceInstance {
    /// Start building an instance; validation happens in [`ServiceInstanceBuilder::build`].
    pub fn builder(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> ServiceInstanceBuilder {
        ServiceInstanceBuilder {
            id: None,
            name: name.into(),
            host: host.into(),
            port,
            version: String::new(),
            tags: BTreeSet::new(),
            health: HealthStatus::Unknown,
        }
    }

    /// `host:port` authority used for outbound calls
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the instance, without a trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority())
    }

    pub fn is_healthy(&self) -> bool {
        self.health == HealthStatus::Healthy
    }
}

/// Builder for [`ServiceInstance`] that rejects malformed registrations.
#[derive(Debug, Clone)]
pub struct ServiceInstanceBuilder {
    id: Option<InstanceId>,
    name: String,
    host: String,
    port: u16,
    version: String,
    tags: BTreeSet<String>,
    health: HealthStatus,
}

impl ServiceInstanceBuilder {
    /// Use a caller-chosen id instead of a generated one
    pub fn id(mut self, id: impl Into<InstanceId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Initial health; defaults to `Unknown`
    pub fn health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> RegistrationResult<ServiceInstance> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }

        let host = self.host.trim().to_string();
        if host.is_empty() {
            return Err(RegistrationError::EmptyHost(name));
        }

        if self.port == 0 {
            return Err(RegistrationError::InvalidPort {
                service: name,
                port: self.port,
            });
        }

        Ok(ServiceInstance {
            id: self.id.unwrap_or_else(|| InstanceId::generate(&name)),
            name,
            host,
            port: self.port,
            version: self.version,
            tags: self.tags,
            health: self.health,
            last_seen: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let instance = ServiceInstance::builder("auth-service", "10.0.0.4", 8081)
            .build()
            .expect("valid registration");

        assert_eq!(instance.name, "auth-service");
        assert_eq!(instance.health, HealthStatus::Unknown);
        assert!(instance.id.as_str().starts_with("auth-service-"));
        assert_eq!(instance.base_url(), "http://10.0.0.4:8081");
    }

    #[test]
    fn test_builder_rejects_malformed_input() {
        assert_eq!(
            ServiceInstance::builder("  ", "localhost", 80).build(),
            Err(RegistrationError::EmptyName)
        );
        assert!(matches!(
            ServiceInstance::builder("svc", "", 80).build(),
            Err(RegistrationError::EmptyHost(_))
        ));
        assert!(matches!(
            ServiceInstance::builder("svc", "localhost", 0).build(),
            Err(RegistrationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = InstanceId::generate("svc");
        let b = InstanceId::generate("svc");
        assert_ne!(a, b);
    }

    #[test]
    fn test_tags_are_a_set() {
        let instance = ServiceInstance::builder("svc", "localhost", 9000)
            .tags(["blue", "canary"])
            .tag("blue")
            .build()
            .unwrap();
        assert_eq!(instance.tags.len(), 2);
    }

    #[test]
    fn test_health_status_serde() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unknown).unwrap(),
            "\"unknown\""
        );
        assert_eq!(HealthStatus::Unhealthy.to_string(), "unhealthy");
    }
}
