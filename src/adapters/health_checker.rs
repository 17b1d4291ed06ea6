//! Active health probing, one task per registered instance.
use std::{sync::Arc, time::Duration};

use hyper::StatusCode;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    config::HealthCheckConfig,
    core::{
        instance::{HealthStatus, InstanceId, ServiceInstance},
        registry::ServiceRegistry,
    },
    metrics::increment_health_probe,
    ports::http_client::HttpClient,
    tracing_setup::create_health_check_span,
};

/// What a probe result means for the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    Healthy,
    Unhealthy,
    /// Failed probe below the retry limit; health is left untouched
    Pending { failures: u32 },
}

/// Consecutive-failure counter adding hysteresis to probing.
///
/// Independent from the circuit breaker's failure count.
#[derive(Debug, Clone)]
pub struct HealthCheckTracker {
    max_retries: u32,
    failures: u32,
}

impl HealthCheckTracker {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
            failures: 0,
        }
    }

    pub fn record_success(&mut self) -> ProbeVerdict {
        self.failures = 0;
        ProbeVerdict::Healthy
    }

    /// The counter resets once the limit is reached.
    pub fn record_failure(&mut self) -> ProbeVerdict {
        self.failures += 1;
        if self.failures >= self.max_retries {
            self.failures = 0;
            ProbeVerdict::Unhealthy
        } else {
            ProbeVerdict::Pending {
                failures: self.failures,
            }
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Prober bound to exactly one instance.
pub struct HealthChecker {
    instance_id: InstanceId,
    service: String,
    url: String,
    registry: Arc<ServiceRegistry>,
    http_client: Arc<dyn HttpClient>,
    interval: Duration,
    timeout: Duration,
    tracker: HealthCheckTracker,
}

impl HealthChecker {
    pub fn new(
        instance: &ServiceInstance,
        registry: Arc<ServiceRegistry>,
        http_client: Arc<dyn HttpClient>,
        config: &HealthCheckConfig,
    ) -> Self {
        Self {
            instance_id: instance.id.clone(),
            service: instance.name.clone(),
            url: format!("{}{}", instance.base_url(), config.path),
            registry,
            http_client,
            interval: config.interval(),
            timeout: config.timeout(),
            tracker: HealthCheckTracker::new(config.max_retries),
        }
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe once and write the outcome to the registry.
    ///
    /// Returns `None` once the instance is no longer registered.
    pub async fn check_once(&mut self) -> Option<ProbeVerdict> {
        self.registry.get(&self.instance_id)?;

        let success = match self.http_client.probe(&self.url, self.timeout).await {
            Ok(StatusCode::OK) => true,
            Ok(status) => {
                tracing::debug!(url = %self.url, %status, "Health probe returned non-200");
                false
            }
            Err(e) => {
                tracing::debug!(url = %self.url, error = %e, "Health probe failed");
                false
            }
        };
        increment_health_probe(&self.service, success);

        let verdict = if success {
            self.tracker.record_success()
        } else {
            self.tracker.record_failure()
        };

        let health = match verdict {
            ProbeVerdict::Healthy => HealthStatus::Healthy,
            ProbeVerdict::Unhealthy => HealthStatus::Unhealthy,
            ProbeVerdict::Pending { failures } => {
                tracing::info!(
                    instance.id = %self.instance_id,
                    failures,
                    max_retries = self.tracker.max_retries,
                    "Health probe failed, instance kept in rotation"
                );
                return Some(verdict);
            }
        };

        let previous = self.registry.update_health(&self.instance_id, health)?;
        if previous != health {
            match health {
                HealthStatus::Unhealthy => tracing::warn!(
                    instance.id = %self.instance_id,
                    service = %self.service,
                    from = %previous,
                    "Instance is now UNHEALTHY"
                ),
                _ => tracing::info!(
                    instance.id = %self.instance_id,
                    service = %self.service,
                    from = %previous,
                    "Instance is now {}", health
                ),
            }
        }
        Some(verdict)
    }

    /// Probe immediately, then every interval, until stopped.
    pub fn spawn(self) -> HealthCheckHandle {
        let token = CancellationToken::new();
        let instance_id = self.instance_id.clone();
        let span = create_health_check_span(&self.service, self.instance_id.as_str());
        let task = tokio::spawn(self.run(token.clone()).instrument(span));

        HealthCheckHandle {
            instance_id,
            token,
            task,
        }
    }

    async fn run(mut self, token: CancellationToken) {
        tracing::debug!(url = %self.url, interval = ?self.interval, "Health checker started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Cancelling mid-probe drops the future before any registry write.
            let verdict = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                verdict = self.check_once() => verdict,
            };

            if verdict.is_none() {
                tracing::debug!("Instance deregistered, health checker exiting");
                break;
            }
        }

        tracing::debug!("Health checker stopped");
    }
}

/// Owner of a running checker task.
pub struct HealthCheckHandle {
    instance_id: InstanceId,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthCheckHandle {
    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the task and wait for it to exit. No health write happens
    /// after this returns.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(instance.id = %self.instance_id, error = %e, "Health checker task failed");
        }
    }
}
