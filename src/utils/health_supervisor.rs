//! Ownership of running health checkers, keyed by instance id.
use std::sync::Arc;

use scc::HashMap;

use crate::{
    adapters::health_checker::{HealthCheckHandle, HealthChecker},
    config::HealthCheckConfig,
    core::{
        instance::{InstanceId, ServiceInstance},
        registry::ServiceRegistry,
    },
    ports::http_client::HttpClient,
};

/// Starts one checker per watched instance and stops it on `unwatch`.
///
/// Does nothing when health checking is disabled.
pub struct HealthCheckSupervisor {
    registry: Arc<ServiceRegistry>,
    http_client: Arc<dyn HttpClient>,
    config: HealthCheckConfig,
    handles: HashMap<InstanceId, HealthCheckHandle>,
}

impl HealthCheckSupervisor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        http_client: Arc<dyn HttpClient>,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            http_client,
            config,
            handles: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Start probing `instance`, replacing any checker already running for its id.
    pub async fn watch(&self, instance: &ServiceInstance) {
        if !self.config.enabled {
            return;
        }

        // The previous checker must be gone before the new one probes
        if let Some((_, previous)) = self.handles.remove_async(&instance.id).await {
            previous.stop().await;
        }

        let handle = HealthChecker::new(
            instance,
            self.registry.clone(),
            self.http_client.clone(),
            &self.config,
        )
        .spawn();

        if let Err((_, raced)) = self.handles.insert_async(instance.id.clone(), handle).await {
            // A concurrent watch for the same id won
            raced.stop().await;
            return;
        }

        tracing::info!(instance.id = %instance.id, service = %instance.name, "Health checker started");
    }

    /// Stop the checker for `id`. Returns whether one was running.
    pub async fn unwatch(&self, id: &InstanceId) -> bool {
        match self.handles.remove_async(id).await {
            Some((_, handle)) => {
                handle.stop().await;
                tracing::info!(instance.id = %id, "Health checker stopped");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every checker and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let mut ids = Vec::new();
        self.handles
            .retain_async(|id, _| {
                ids.push(id.clone());
                true
            })
            .await;

        for id in &ids {
            if let Some((_, handle)) = self.handles.remove_async(id).await {
                handle.stop().await;
            }
        }
        tracing::info!(stopped = ids.len(), "All health checkers stopped");
    }
}
