//! Authoritative in-memory table of service instances.
//!
//! The table sits behind a single `RwLock`: lookups from router tasks share
//! the read side while health writes take the write side for a single map
//! operation. The raw map is never handed out; every read returns clones.
use std::{
    collections::{BTreeSet, HashMap},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::Utc;

use crate::{
    config::LoadBalanceStrategy,
    core::{
        instance::{HealthStatus, InstanceId, RegistrationResult, ServiceInstance},
        load_balancer::{LoadBalancerFactory, LoadBalancingStrategy},
    },
    metrics::{clear_instance_health_status, set_instance_health_status},
};

pub struct ServiceRegistry {
    instances: RwLock<HashMap<InstanceId, ServiceInstance>>,
    strategy: Box<dyn LoadBalancingStrategy>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(LoadBalanceStrategy::RoundRobin)
    }
}

impl ServiceRegistry {
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self::with_strategy(LoadBalancerFactory::create_strategy(strategy))
    }

    pub fn with_strategy(strategy: Box<dyn LoadBalancingStrategy>) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            strategy,
        }
    }

    // Every write is a single map operation, so a poisoned table is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<InstanceId, ServiceInstance>> {
        self.instances.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<InstanceId, ServiceInstance>> {
        self.instances.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace an instance by id and refresh its `last_seen`.
    pub fn register(&self, mut instance: ServiceInstance) -> InstanceId {
        instance.last_seen = Utc::now();
        let id = instance.id.clone();

        tracing::info!(
            instance.id = %id,
            service = %instance.name,
            address = %instance.authority(),
            version = %instance.version,
            "Registered service instance"
        );

        let previous = self.write().insert(id.clone(), instance);
        if previous.is_some() {
            tracing::debug!(instance.id = %id, "Replaced existing registration");
        }
        id
    }

    /// Validate and register a new instance, returning its generated id.
    pub fn register_service(
        &self,
        name: &str,
        host: &str,
        port: u16,
        version: &str,
        tags: impl IntoIterator<Item = String>,
    ) -> RegistrationResult<InstanceId> {
        let instance = ServiceInstance::builder(name, host, port)
            .version(version)
            .tags(tags)
            .build()?;
        Ok(self.register(instance))
    }

    /// Remove an instance. Returns the removed entry, if any.
    pub fn deregister(&self, id: &InstanceId) -> Option<ServiceInstance> {
        let mut instances = self.write();
        let removed = instances.remove(id);
        if let Some(instance) = &removed {
            // Same lock as update_health, so the gauge cannot reappear
            clear_instance_health_status(&instance.name, id.as_str());
            tracing::info!(instance.id = %id, service = %instance.name, "Deregistered service instance");
        }
        removed
    }

    /// Set the health of an instance and refresh `last_seen`.
    ///
    /// Returns the previous health, or `None` when the id is unknown (no-op).
    pub fn update_health(&self, id: &InstanceId, health: HealthStatus) -> Option<HealthStatus> {
        let mut instances = self.write();
        let instance = instances.get_mut(id)?;
        let previous = instance.health;
        instance.health = health;
        instance.last_seen = Utc::now();
        set_instance_health_status(&instance.name, id.as_str(), health);
        Some(previous)
    }

    /// First healthy instance of `service`, without load balancing.
    pub fn get_by_name(&self, service: &str) -> Option<ServiceInstance> {
        self.read()
            .values()
            .find(|instance| instance.name == service && instance.is_healthy())
            .cloned()
    }

    /// One healthy instance of `service`, chosen by the configured strategy.
    pub fn get_healthy(&self, service: &str) -> Option<ServiceInstance> {
        let instances = self.read();
        let mut healthy: Vec<&ServiceInstance> = instances
            .values()
            .filter(|instance| instance.name == service && instance.is_healthy())
            .collect();
        healthy.sort_unstable_by(|a, b| a.id.cmp(&b.id));

        let index = self.strategy.select_index(healthy.len())?;
        healthy.get(index).map(|instance| (*instance).clone())
    }

    /// Snapshot of every instance of `service`, whatever its health.
    pub fn list_by_name(&self, service: &str) -> Vec<ServiceInstance> {
        let mut matching: Vec<ServiceInstance> = self
            .read()
            .values()
            .filter(|instance| instance.name == service)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching
    }

    /// Snapshot of the whole table.
    pub fn list_all(&self) -> Vec<ServiceInstance> {
        let mut all: Vec<ServiceInstance> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn get(&self, id: &InstanceId) -> Option<ServiceInstance> {
        self.read().get(id).cloned()
    }

    /// Distinct service names currently registered
    pub fn service_names(&self) -> BTreeSet<String> {
        self.read()
            .values()
            .map(|instance| instance.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
