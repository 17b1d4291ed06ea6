//! Core gateway state.
//!
//! `GatewayService` ties immutable configuration (`GatewayConfig`) to the
//! runtime state shared by every adapter:
//! * the service registry (instances and their health)
//! * one circuit breaker per logical service
//! * the route table mapping request paths to services
//!
//! Like the rest of `core` it performs no I/O, so it can be exercised in
//! isolation.
use std::sync::Arc;

use crate::{
    config::{GatewayConfig, HealthCheckConfig, ServiceEntry},
    core::{
        circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry},
        error::GatewayError,
        health_monitor::{HealthMonitor, HealthReport},
        instance::{HealthStatus, InstanceId, RegistrationResult, ServiceInstance},
        registry::ServiceRegistry,
        routes::RouteTable,
    },
};

/// Shared gateway state. Wrap in an `Arc` and hand it to adapters.
pub struct GatewayService {
    config: Arc<GatewayConfig>,
    registry: Arc<ServiceRegistry>,
    breakers: CircuitBreakerRegistry,
    routes: RouteTable,
}

impl GatewayService {
    /// Build the gateway state and register the statically configured
    /// instances. Breakers for every known service are created up front.
    pub async fn new(config: Arc<GatewayConfig>) -> RegistrationResult<Self> {
        let registry = Arc::new(ServiceRegistry::new(config.proxy.load_balance));
        let breakers = CircuitBreakerRegistry::new(&config.circuit_breaker);
        let routes = RouteTable::new(&config.routes, config.service_prefix.as_deref());

        let gateway = Self {
            config,
            registry,
            breakers,
            routes,
        };

        for entry in &gateway.config.services {
            gateway.register_entry(entry)?;
        }

        let known_services = gateway
            .config
            .routes
            .values()
            .chain(gateway.config.services.iter().map(|entry| &entry.name))
            .chain(gateway.config.circuit_breaker.overrides.keys());
        for service in known_services {
            gateway.breakers.get(service).await;
        }

        tracing::debug!(
            instances = gateway.registry.len(),
            breakers = gateway.breakers.len(),
            "Gateway state initialised"
        );

        Ok(gateway)
    }

    fn instance_from_entry(entry: &ServiceEntry) -> RegistrationResult<ServiceInstance> {
        let mut builder = ServiceInstance::builder(&entry.name, &entry.host, entry.port)
            .version(&entry.version)
            .tags(entry.tags.iter().cloned());
        if let Some(id) = &entry.id {
            builder = builder.id(InstanceId::new(id.clone()));
        }
        builder.build()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn health_config(&self) -> &HealthCheckConfig {
        &self.config.health_check
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.breakers
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Health assigned to new registrations: `Unknown` until probed, or
    /// `Healthy` straight away when active checking is disabled.
    pub fn initial_health(&self) -> HealthStatus {
        if self.config.health_check.enabled {
            HealthStatus::Unknown
        } else {
            HealthStatus::Healthy
        }
    }

    /// Validate and register a configured or API-submitted instance.
    ///
    /// Returns the instance as stored, including its registration timestamp.
    pub fn register_entry(&self, entry: &ServiceEntry) -> RegistrationResult<ServiceInstance> {
        let mut instance = Self::instance_from_entry(entry)?;
        instance.health = self.initial_health();
        let id = self.registry.register(instance.clone());
        // A concurrent deregistration may already have removed it
        Ok(self.registry.get(&id).unwrap_or(instance))
    }

    /// Logical service serving `path`.
    pub fn resolve_service<'a>(&'a self, path: &'a str) -> Result<&'a str, GatewayError> {
        self.routes
            .resolve(path)
            .ok_or_else(|| GatewayError::RouteNotFound(path.to_string()))
    }

    /// Healthy instance of `service` picked by the load-balancing strategy.
    pub fn select_instance(&self, service: &str) -> Result<ServiceInstance, GatewayError> {
        self.registry
            .get_healthy(service)
            .ok_or_else(|| GatewayError::NoHealthyInstance(service.to_string()))
    }

    pub async fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers.get(service).await
    }

    pub fn health_report(&self) -> HealthReport {
        HealthMonitor::report(&self.registry)
    }
}
