//! Read-only aggregation of registry health for observability endpoints.
use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::{
    instance::{HealthStatus, ServiceInstance},
    registry::ServiceRegistry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Critical,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Healthy => write!(f, "healthy"),
            OverallStatus::Degraded => write!(f, "degraded"),
            OverallStatus::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthCounts {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}

impl HealthCounts {
    fn record(&mut self, health: HealthStatus) {
        self.total += 1;
        match health {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    #[serde(flatten)]
    pub counts: HealthCounts,
    pub instances: Vec<ServiceInstance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: OverallStatus,
    #[serde(flatten)]
    pub counts: HealthCounts,
    pub services: BTreeMap<String, ServiceHealth>,
    pub timestamp: DateTime<Utc>,
}

pub struct HealthMonitor;

impl HealthMonitor {
    /// Summarize the current registry contents.
    pub fn report(registry: &ServiceRegistry) -> HealthReport {
        Self::summarize(registry.list_all())
    }

    pub fn summarize(instances: Vec<ServiceInstance>) -> HealthReport {
        let mut counts = HealthCounts::default();
        let mut services: BTreeMap<String, ServiceHealth> = BTreeMap::new();

        for instance in instances {
            counts.record(instance.health);
            let service = services
                .entry(instance.name.clone())
                .or_insert_with(|| ServiceHealth {
                    counts: HealthCounts::default(),
                    instances: Vec::new(),
                });
            service.counts.record(instance.health);
            service.instances.push(instance);
        }

        HealthReport {
            status: Self::overall_status(&counts),
            counts,
            services,
            timestamp: Utc::now(),
        }
    }

    /// `healthy` when at least half of a non-empty registry is healthy,
    /// `critical` when a non-empty registry has no healthy instance.
    pub fn overall_status(counts: &HealthCounts) -> OverallStatus {
        if counts.healthy > 0 && counts.healthy * 2 >= counts.total {
            OverallStatus::Healthy
        } else if counts.total > 0 && counts.healthy == 0 {
            OverallStatus::Critical
        } else {
            OverallStatus::Degraded
        }
    }
}
