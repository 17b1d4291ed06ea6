use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use axum::{Router, extract::State, http::StatusCode, routing::get};
use meridian::{
    HttpClientAdapter,
    config::HealthCheckConfig,
    core::{HealthStatus, InstanceId, ServiceInstance, ServiceRegistry},
    ports::http_client::HttpClient,
    utils::HealthCheckSupervisor,
};

async fn health(State(healthy): State<Arc<AtomicBool>>) -> StatusCode {
    if healthy.load(Ordering::SeqCst) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn spawn_backend(healthy: Arc<AtomicBool>) -> SocketAddr {
    let app = Router::new()
        .route("/health", get(health))
        .with_state(healthy);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Poll until the instance reaches `expected` or the deadline passes.
async fn wait_for_health(registry: &ServiceRegistry, id: &InstanceId, expected: HealthStatus) {
    let reached = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if registry.get(id).map(|i| i.health) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "instance {id} never became {expected}");
}

fn config() -> HealthCheckConfig {
    HealthCheckConfig {
        enabled: true,
        interval_secs: 1,
        timeout_secs: 1,
        max_retries: 2,
        path: "/health".to_string(),
    }
}

#[tokio::test]
async fn test_instance_follows_backend_health() {
    let healthy = Arc::new(AtomicBool::new(true));
    let addr = spawn_backend(healthy.clone()).await;

    let registry = Arc::new(ServiceRegistry::default());
    let instance = ServiceInstance::builder("auth-service", addr.ip().to_string(), addr.port())
        .build()
        .unwrap();
    let id = registry.register(instance.clone());
    assert_eq!(registry.get(&id).unwrap().health, HealthStatus::Unknown);

    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new().unwrap());
    let supervisor = HealthCheckSupervisor::new(registry.clone(), http_client, config());
    supervisor.watch(&instance).await;

    // First probe fires immediately
    wait_for_health(&registry, &id, HealthStatus::Healthy).await;
    assert!(registry.get_healthy("auth-service").is_some());

    healthy.store(false, Ordering::SeqCst);
    wait_for_health(&registry, &id, HealthStatus::Unhealthy).await;
    assert!(registry.get_healthy("auth-service").is_none());

    healthy.store(true, Ordering::SeqCst);
    wait_for_health(&registry, &id, HealthStatus::Healthy).await;

    supervisor.shutdown().await;
    assert!(supervisor.is_empty());
}

#[tokio::test]
async fn test_unreachable_instance_becomes_unhealthy() {
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let registry = Arc::new(ServiceRegistry::default());
    let instance = ServiceInstance::builder("ghost", addr.ip().to_string(), addr.port())
        .id("ghost-1")
        .build()
        .unwrap();
    let id = registry.register(instance.clone());

    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new().unwrap());
    let supervisor = HealthCheckSupervisor::new(registry.clone(), http_client, config());
    supervisor.watch(&instance).await;

    wait_for_health(&registry, &id, HealthStatus::Unhealthy).await;

    // Deregistration stops the probing for good
    assert!(supervisor.unwatch(&id).await);
    assert!(registry.deregister(&id).is_some());
    assert!(supervisor.is_empty());
}
