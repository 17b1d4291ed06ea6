//! Per-service circuit breakers driven by real proxy traffic.
//!
//! ```text
//! Closed   --(failures >= threshold)-->            Open
//! Open     --(reset timeout elapsed, next call)--> HalfOpen
//! HalfOpen --(quota consecutive successes)-->      Closed
//! HalfOpen --(any failure)-->                      Open
//! ```
//!
//! Each breaker guards its counters with its own mutex so every transition is
//! linearizable; breakers of different services share nothing.
//!
//! Every admitted call holds an [`Admission`] naming the half-open window it
//! was admitted in. Outcomes reported for another window never touch the
//! current window's probation counters.
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use scc::HashMap as ConcurrentMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    config::{BreakerPolicy, CircuitBreakerConfig},
    metrics::set_breaker_state,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for the state gauge
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Permission for one call, returned by [`CircuitBreaker::can_execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Half-open window the call was admitted in
    generation: u64,
    half_open: bool,
}

impl Admission {
    pub fn is_half_open(&self) -> bool {
        self.half_open
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure: Option<Instant>,
    half_open_admitted: u32,
    half_open_successes: u32,
    /// Bumped on every Open -> HalfOpen transition
    generation: u64,
}

impl BreakerState {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure: None,
            half_open_admitted: 0,
            half_open_successes: 0,
            generation: 0,
        }
    }

    /// Whether `admission` is a probe of the half-open window in progress.
    fn in_current_window(&self, admission: Admission) -> bool {
        self.state == CircuitState::HalfOpen
            && admission.half_open
            && admission.generation == self.generation
    }

    fn admit(&self, half_open: bool) -> Admission {
        Admission {
            generation: self.generation,
            half_open,
        }
    }
}

/// Point-in-time view of a breaker, for observability endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub failures: u32,
    pub half_open_admitted: u32,
    pub half_open_successes: u32,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    half_open_max_requests: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, policy: &BreakerPolicy) -> Self {
        Self {
            service: service.into(),
            failure_threshold: policy.failure_threshold.max(1),
            reset_timeout: policy.reset_timeout(),
            half_open_max_requests: policy.half_open_max_requests.max(1),
            inner: Mutex::new(BreakerState::closed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        tracing::info!(service = %self.service, %from, %to, "Circuit breaker transition");
        set_breaker_state(&self.service, to);
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Whether a call may be attempted right now; `None` means fail fast.
    ///
    /// In `Open` the first call after the reset timeout moves the breaker to
    /// `HalfOpen` and is admitted; in `HalfOpen` at most the configured quota of
    /// calls is admitted per probation window. The returned admission must be
    /// handed back to exactly one of `on_success`, `on_failure` or `release`.
    pub fn can_execute(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(inner.admit(false)),
            CircuitState::Open => {
                let expired = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() > self.reset_timeout);
                if !expired {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.generation += 1;
                inner.half_open_successes = 0;
                inner.half_open_admitted = 1;
                Some(inner.admit(true))
            }
            CircuitState::HalfOpen => {
                if inner.half_open_admitted < self.half_open_max_requests {
                    inner.half_open_admitted += 1;
                    Some(inner.admit(true))
                } else {
                    None
                }
            }
        }
    }

    pub fn on_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                if !inner.in_current_window(admission) {
                    return;
                }
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.half_open_max_requests {
                    inner.failures = 0;
                    inner.half_open_admitted = 0;
                    inner.half_open_successes = 0;
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn on_failure(&self, admission: Admission) {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        inner.failures = inner.failures.saturating_add(1);

        match inner.state {
            CircuitState::Closed if inner.failures >= self.failure_threshold => {
                tracing::warn!(
                    service = %self.service,
                    failures = inner.failures,
                    "Failure threshold reached, opening circuit"
                );
                self.transition(&mut inner, CircuitState::Open);
            }
            CircuitState::HalfOpen if inner.in_current_window(admission) => {
                inner.half_open_successes = 0;
                inner.half_open_admitted = 0;
                self.transition(&mut inner, CircuitState::Open);
            }
            _ => {}
        }
    }

    /// Give back an admission whose outcome will never be reported.
    ///
    /// Only a probe of the current half-open window frees a slot.
    pub fn release(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.in_current_window(admission) {
            inner.half_open_admitted = inner.half_open_admitted.saturating_sub(1);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            service: self.service.clone(),
            state: inner.state,
            failures: inner.failures,
            half_open_admitted: inner.half_open_admitted,
            half_open_successes: inner.half_open_successes,
        }
    }
}

/// Get-or-create map of breakers keyed by service name.
pub struct CircuitBreakerRegistry {
    defaults: BreakerPolicy,
    overrides: HashMap<String, BreakerPolicy>,
    breakers: ConcurrentMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            defaults: config.policy(),
            overrides: config.overrides.clone(),
            breakers: ConcurrentMap::new(),
        }
    }

    fn policy_for(&self, service: &str) -> &BreakerPolicy {
        self.overrides.get(service).unwrap_or(&self.defaults)
    }

    /// Breaker for `service`, created on first use.
    pub async fn get(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self
            .breakers
            .read_async(service, |_, breaker| breaker.clone())
            .await
        {
            return existing;
        }

        self.breakers
            .entry_async(service.to_string())
            .await
            .or_insert_with(|| {
                tracing::debug!(service, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(service, self.policy_for(service)))
            })
            .get()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    pub async fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let mut snapshots = Vec::new();
        self.breakers
            .retain_async(|_, breaker| {
                snapshots.push(breaker.snapshot());
                true
            })
            .await;
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}
