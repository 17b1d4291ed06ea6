use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use meridian::{
    HttpClientAdapter, HttpHandler,
    config::{BreakerPolicy, GatewayConfig, ServiceEntry},
    core::{CircuitState, GatewayService},
    ports::http_client::HttpClient,
    utils::HealthCheckSupervisor,
};
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

#[derive(Default)]
struct Backend {
    hits: AtomicUsize,
    last_body: Mutex<Option<Bytes>>,
}

/// Echo the forwarded request back as JSON; paths under `/broken/` fail with 500.
async fn echo(
    State(backend): State<Arc<Backend>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    if uri.path().contains("/broken/") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let mut response_headers = HeaderMap::new();
    response_headers.insert("x-backend", "echo".parse().unwrap());
    (
        StatusCode::CREATED,
        response_headers,
        Json(json!({
            "path": uri.path_and_query().map(|pq| pq.as_str().to_string()),
            "host": header("host"),
            "forwarded_host": header("x-forwarded-host"),
            "forwarded_for": header("x-forwarded-for"),
            "request_id": header("x-request-id"),
            "service": header("x-gateway-service"),
            "tenant": header("x-tenant"),
            "authorization": header("authorization"),
            "body": String::from_utf8_lossy(&body),
        })),
    )
        .into_response()
}

/// Store the received bytes and send them straight back.
async fn raw(State(backend): State<Arc<Backend>>, body: Bytes) -> Response {
    backend.hits.fetch_add(1, Ordering::SeqCst);
    *backend.last_body.lock().unwrap() = Some(body.clone());
    (
        StatusCode::OK,
        [("content-type", "application/octet-stream")],
        body,
    )
        .into_response()
}

async fn spawn_backend() -> (SocketAddr, Arc<Backend>) {
    let backend = Arc::new(Backend::default());
    let app = Router::new()
        .route("/api/v1/blobs/raw", post(raw))
        .fallback(echo)
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, backend)
}

fn entry(name: &str, addr: SocketAddr) -> ServiceEntry {
    ServiceEntry {
        id: None,
        name: name.to_string(),
        host: addr.ip().to_string(),
        port: addr.port(),
        version: "1.0.0".to_string(),
        tags: vec![],
    }
}

async fn create_gateway(mut config: GatewayConfig) -> Router {
    config.health_check.enabled = false;
    let gateway = Arc::new(GatewayService::new(Arc::new(config)).await.unwrap());
    let http_client: Arc<dyn HttpClient> = Arc::new(HttpClientAdapter::new().unwrap());
    let supervisor = Arc::new(HealthCheckSupervisor::new(
        gateway.registry().clone(),
        http_client.clone(),
        gateway.health_config().clone(),
    ));
    Arc::new(HttpHandler::new(gateway, http_client, supervisor).unwrap()).router()
}

async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_request_is_forwarded_with_gateway_headers() {
    let (addr, backend) = spawn_backend().await;
    let app = create_gateway(
        GatewayConfig::builder()
            .service_prefix("/api/v1")
            .service(entry("orders", addr))
            .build(),
    )
    .await;

    let mut request = Request::builder()
        .method("POST")
        .uri("/api/v1/orders/items?limit=5")
        .header("host", "gateway.example.com")
        .header("x-request-id", "req-42")
        .header("x-tenant", "acme-eu")
        .header("authorization", "Bearer s3cr3t.t0k3n")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"qty":2}"#))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 55000))));

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-backend"], "echo");

    let echoed = body_json(response).await;
    assert_eq!(echoed["path"], "/api/v1/orders/items?limit=5");
    assert_eq!(echoed["host"], addr.to_string());
    assert_eq!(echoed["forwarded_host"], "gateway.example.com");
    assert_eq!(echoed["forwarded_for"], "10.0.0.7");
    assert_eq!(echoed["request_id"], "req-42");
    assert_eq!(echoed["service"], "orders");
    assert_eq!(echoed["tenant"], "acme-eu");
    assert_eq!(echoed["authorization"], "Bearer s3cr3t.t0k3n");
    assert_eq!(echoed["body"], r#"{"qty":2}"#);
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bodies_pass_through_byte_for_byte() {
    let (addr, backend) = spawn_backend().await;
    let app = create_gateway(
        GatewayConfig::builder()
            .service_prefix("/api/v1")
            .service(entry("blobs", addr))
            .build(),
    )
    .await;

    // Not valid UTF-8, so any re-encoding would show
    let payload: Vec<u8> = vec![0x00, 0x9f, 0x92, 0x96, 0xff, b'\n', 0xc3, 0x28, 0x7f];
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/blobs/raw")
        .header("content-type", "application/octet-stream")
        .body(Body::from(payload.clone()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "application/octet-stream"
    );

    let received = backend.last_body.lock().unwrap().clone().unwrap();
    assert_eq!(received.as_ref(), payload.as_slice());

    let returned = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(returned.as_ref(), payload.as_slice());
    assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_generated_request_id_reaches_upstream() {
    let (addr, _) = spawn_backend().await;
    let app = create_gateway(
        GatewayConfig::builder()
            .route("/calls", "calling-service")
            .service(entry("calling-service", addr))
            .build(),
    )
    .await;

    let request = Request::builder()
        .uri("/calls/123")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let echoed_id = response.headers()["x-request-id"]
        .to_str()
        .unwrap()
        .to_string();
    assert!(!echoed_id.is_empty());

    let echoed = body_json(response).await;
    assert_eq!(echoed["request_id"], echoed_id);
    assert_eq!(echoed["forwarded_for"], Value::Null);
}

#[tokio::test]
async fn test_server_errors_open_the_breaker() {
    let (addr, backend) = spawn_backend().await;
    let mut config = GatewayConfig::builder()
        .service_prefix("/api/v1")
        .service(entry("broken", addr))
        .build();
    config.circuit_breaker.overrides.insert(
        "broken".to_string(),
        BreakerPolicy {
            failure_threshold: 2,
            reset_timeout_secs: 60,
            half_open_max_requests: 1,
        },
    );
    let app = create_gateway(config).await;

    let call = |app: Router| async move {
        app.oneshot(
            Request::builder()
                .uri("/api/v1/broken/thing")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    };

    for _ in 0..2 {
        let response = call(app.clone()).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(response).await["error"], "bad_gateway");
    }

    let response = call(app.clone()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "service_unavailable");
    // The open breaker short-circuits without touching the backend
    assert_eq!(backend.hits.load(Ordering::SeqCst), 2);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/breakers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let breakers = body_json(response).await;
    let broken = breakers
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["service"] == "broken")
        .unwrap();
    assert_eq!(broken["state"], json!(CircuitState::Open));
}

#[tokio::test]
async fn test_unreachable_instance_is_bad_gateway() {
    // Bind and drop to get a port nobody listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let app = create_gateway(
        GatewayConfig::builder()
            .service_prefix("/api/v1")
            .service(entry("ghost", addr))
            .build(),
    )
    .await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/ghost/anything")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_unknown_route_and_missing_instances() {
    let app = create_gateway(GatewayConfig::builder().service_prefix("/api/v1").build()).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/elsewhere")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "route_not_found");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/orders/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"], "service_unavailable");
}
