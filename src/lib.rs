//! Meridian - an API gateway core for microservice deployments.
//!
//! Meridian sits in front of a fleet of backend services and forwards client
//! requests to them. It keeps a registry of service instances, probes each
//! instance in the background, and wraps every logical service in a circuit
//! breaker so that a failing backend is cut off quickly.
//!
//! # Features
//! - In-memory service registry with round-robin or random instance selection
//! - Active HTTP health checks with hysteresis (`max_retries` consecutive
//!   failures before an instance is marked unhealthy)
//! - Per-service circuit breakers (closed, open, half-open) with per-service
//!   policy overrides
//! - Prefix-based reverse proxy routing with request-id propagation and
//!   `X-Forwarded-*` headers
//! - Aggregated health report and admin endpoints for registration
//! - Metrics via the `metrics` facade and structured tracing via `tracing`
//! - Graceful shutdown of the listener and all health checkers
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use meridian::{GatewayService, config::GatewayConfig};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg: GatewayConfig = meridian::config::load_config("config.toml").await?;
//! let gateway = Arc::new(GatewayService::new(Arc::new(cfg)).await?);
//! // Hand the gateway to `HttpHandler` to obtain an axum router (see the binary crate)
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! Business rules live in `core` and perform no I/O. Outbound HTTP goes
//! through the `ports::http_client::HttpClient` trait, implemented by
//! `adapters::HttpClientAdapter`. The axum surface and the background
//! health checkers are adapters as well.
//!
//! # Error Handling
//! Request-level failures are `core::GatewayError` values that render as JSON
//! error bodies. Startup and configuration paths return `eyre::Result<T>` with
//! context attached through `WrapErr`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{HealthChecker, HttpClientAdapter, HttpHandler, ProxyRouter},
    core::{GatewayError, GatewayService},
    ports::http_client::HttpClient,
    utils::{GracefulShutdown, HealthCheckSupervisor},
};
