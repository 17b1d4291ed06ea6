//! Metrics helpers for Meridian.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is bundled;
//! the embedding application installs whatever recorder it wants.
//!
//! Provided metrics:
//! * `meridian_requests_total` (counter; service, method, status)
//! * `meridian_request_duration_seconds` (histogram; service, method)
//! * `meridian_upstream_failures_total` (counter; service, reason)
//! * `meridian_rejected_requests_total` (counter; service, reason)
//! * `meridian_instance_health_status` (gauge; service, instance)
//! * `meridian_circuit_breaker_state` (gauge; service)
//! * `meridian_health_probes_total` (counter; service, outcome)
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

use crate::core::{circuit_breaker::CircuitState, instance::HealthStatus};

pub const MERIDIAN_REQUESTS_TOTAL: &str = "meridian_requests_total";
pub const MERIDIAN_REQUEST_DURATION_SECONDS: &str = "meridian_request_duration_seconds";
pub const MERIDIAN_UPSTREAM_FAILURES_TOTAL: &str = "meridian_upstream_failures_total";
pub const MERIDIAN_REJECTED_REQUESTS_TOTAL: &str = "meridian_rejected_requests_total";
pub const MERIDIAN_INSTANCE_HEALTH_STATUS: &str = "meridian_instance_health_status";
pub const MERIDIAN_CIRCUIT_BREAKER_STATE: &str = "meridian_circuit_breaker_state";
pub const MERIDIAN_HEALTH_PROBES_TOTAL: &str = "meridian_health_probes_total";

/// Last exported value of every gauge, keyed by `"{metric}:{labels}"`.
static GAUGES: Lazy<Mutex<HashMap<String, f64>>> = Lazy::new(|| {
    describe_counter!(
        MERIDIAN_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests proxied by the gateway."
    );
    describe_histogram!(
        MERIDIAN_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency of requests proxied by the gateway."
    );
    describe_counter!(
        MERIDIAN_UPSTREAM_FAILURES_TOTAL,
        Unit::Count,
        "Upstream calls counted as circuit breaker failures."
    );
    describe_counter!(
        MERIDIAN_REJECTED_REQUESTS_TOTAL,
        Unit::Count,
        "Requests rejected before reaching an upstream."
    );
    describe_gauge!(
        MERIDIAN_INSTANCE_HEALTH_STATUS,
        "Health of a service instance (1 healthy, 0 unhealthy, -1 unknown)"
    );
    describe_gauge!(
        MERIDIAN_CIRCUIT_BREAKER_STATE,
        "Circuit breaker state per service (0 closed, 1 half-open, 2 open)"
    );
    describe_counter!(
        MERIDIAN_HEALTH_PROBES_TOTAL,
        Unit::Count,
        "Active health probes by outcome."
    );

    Mutex::new(HashMap::new())
});

fn remember_gauge(key: String, value: f64) {
    GAUGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key, value);
}

fn health_value(health: HealthStatus) -> f64 {
    match health {
        HealthStatus::Healthy => 1.0,
        HealthStatus::Unhealthy => 0.0,
        HealthStatus::Unknown => -1.0,
    }
}

pub fn set_instance_health_status(service: &str, instance: &str, health: HealthStatus) {
    let value = health_value(health);
    remember_gauge(
        format!("{MERIDIAN_INSTANCE_HEALTH_STATUS}:{service}/{instance}"),
        value,
    );
    gauge!(
        MERIDIAN_INSTANCE_HEALTH_STATUS,
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(value);
}

/// Forget the health gauge of a deregistered instance.
pub fn clear_instance_health_status(service: &str, instance: &str) {
    GAUGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&format!("{MERIDIAN_INSTANCE_HEALTH_STATUS}:{service}/{instance}"));
    gauge!(
        MERIDIAN_INSTANCE_HEALTH_STATUS,
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(health_value(HealthStatus::Unknown));
}

pub fn set_breaker_state(service: &str, state: CircuitState) {
    let value = state.as_gauge();
    remember_gauge(format!("{MERIDIAN_CIRCUIT_BREAKER_STATE}:{service}"), value);
    gauge!(MERIDIAN_CIRCUIT_BREAKER_STATE, "service" => service.to_string()).set(value);
}

pub fn increment_request_total(service: &str, method: &str, status: u16) {
    counter!(
        MERIDIAN_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_request_duration(service: &str, method: &str, duration: Duration) {
    histogram!(
        MERIDIAN_REQUEST_DURATION_SECONDS,
        "service" => service.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// `reason` is one of `transport`, `timeout`, `status`.
pub fn increment_upstream_failure(service: &str, reason: &'static str) {
    counter!(
        MERIDIAN_UPSTREAM_FAILURES_TOTAL,
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// `reason` is the error code returned to the caller.
pub fn increment_rejected_request(service: &str, reason: &'static str) {
    counter!(
        MERIDIAN_REJECTED_REQUESTS_TOTAL,
        "service" => service.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn increment_health_probe(service: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        MERIDIAN_HEALTH_PROBES_TOTAL,
        "service" => service.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// RAII helper recording the duration of a proxied request on drop.
pub struct RequestTimer {
    start: Instant,
    service: String,
    method: String,
}

impl RequestTimer {
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            service: service.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.service, &self.method, self.start.elapsed());
    }
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&GAUGES);
    tracing::debug!("Meridian metric descriptions registered");
}

/// Snapshot of the last value written to every gauge.
pub fn get_current_gauges() -> HashMap<String, f64> {
    GAUGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
