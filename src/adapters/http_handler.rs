//! Axum surface of the gateway: liveness, admin endpoints and the proxy
//! fallback.
use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Path, Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use eyre::Result;
use serde_json::json;

use crate::{
    adapters::{middleware::request_timing_middleware, proxy::ProxyRouter},
    config::ServiceEntry,
    core::{
        circuit_breaker::BreakerSnapshot,
        error::GatewayError,
        gateway::GatewayService,
        health_monitor::OverallStatus,
        instance::{InstanceId, ServiceInstance},
    },
    ports::http_client::HttpClient,
    utils::HealthCheckSupervisor,
};

/// HTTP handler for the Meridian gateway
pub struct HttpHandler {
    gateway: Arc<GatewayService>,
    proxy: ProxyRouter,
    supervisor: Arc<HealthCheckSupervisor>,
}

impl HttpHandler {
    pub fn new(
        gateway: Arc<GatewayService>,
        http_client: Arc<dyn HttpClient>,
        supervisor: Arc<HealthCheckSupervisor>,
    ) -> Result<Self> {
        let proxy = ProxyRouter::new(gateway.clone(), http_client)?;
        Ok(Self {
            gateway,
            proxy,
            supervisor,
        })
    }

    /// Build the axum router. Anything not matched by an admin route is proxied.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(liveness))
            .route("/admin/health", get(health_report))
            .route("/admin/services", get(list_services).post(register_service))
            .route("/admin/services/{name}", get(list_service_instances))
            .route("/admin/instances/{id}", delete(deregister_instance))
            .route("/admin/breakers", get(list_breakers))
            .fallback(proxy)
            .layer(middleware::from_fn(request_timing_middleware))
            .with_state(self)
    }
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn health_report(State(handler): State<Arc<HttpHandler>>) -> Response {
    let report = handler.gateway.health_report();
    let status = if report.status == OverallStatus::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}

async fn list_services(State(handler): State<Arc<HttpHandler>>) -> Json<Vec<ServiceInstance>> {
    Json(handler.gateway.registry().list_all())
}

async fn list_service_instances(
    State(handler): State<Arc<HttpHandler>>,
    Path(name): Path<String>,
) -> Json<Vec<ServiceInstance>> {
    Json(handler.gateway.registry().list_by_name(&name))
}

async fn register_service(
    State(handler): State<Arc<HttpHandler>>,
    Json(entry): Json<ServiceEntry>,
) -> Result<Response, GatewayError> {
    let instance = handler.gateway.register_entry(&entry)?;
    handler.supervisor.watch(&instance).await;
    Ok((StatusCode::CREATED, Json(json!({ "id": instance.id }))).into_response())
}

async fn deregister_instance(
    State(handler): State<Arc<HttpHandler>>,
    Path(id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    let id = InstanceId::new(id);
    handler.supervisor.unwatch(&id).await;
    handler
        .gateway
        .registry()
        .deregister(&id)
        .ok_or_else(|| GatewayError::InstanceNotFound(id.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_breakers(State(handler): State<Arc<HttpHandler>>) -> Json<Vec<BreakerSnapshot>> {
    Json(handler.gateway.breakers().snapshots().await)
}

async fn proxy(State(handler): State<Arc<HttpHandler>>, req: Request) -> Response<AxumBody> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    handler.proxy.handle(req, peer).await
}
