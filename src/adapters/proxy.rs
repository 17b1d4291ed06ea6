//! Reverse-proxy routing: path → service → healthy instance → upstream call.
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{body::Body as AxumBody, response::IntoResponse};
use eyre::{Result, WrapErr};
use http::{HeaderName, HeaderValue, Request, Response, Uri, header};
use tokio::time::Instant;
use tracing::Instrument;

use crate::{
    core::{
        circuit_breaker::{Admission, CircuitBreaker},
        error::GatewayError,
        gateway::GatewayService,
        instance::ServiceInstance,
    },
    metrics::{
        RequestTimer, increment_rejected_request, increment_request_total,
        increment_upstream_failure,
    },
    ports::http_client::{HttpClient, HttpClientError},
    tracing_setup::create_request_span,
};

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Outcome reporter for one call admitted by a breaker.
///
/// Dropping it without reporting (the caller went away mid-call) hands the
/// admission back to the breaker.
struct BreakerCall {
    breaker: Arc<CircuitBreaker>,
    admission: Admission,
    reported: bool,
}

impl BreakerCall {
    fn new(breaker: Arc<CircuitBreaker>, admission: Admission) -> Self {
        Self {
            breaker,
            admission,
            reported: false,
        }
    }

    fn success(mut self) {
        self.reported = true;
        self.breaker.on_success(self.admission);
    }

    fn failure(mut self) {
        self.reported = true;
        self.breaker.on_failure(self.admission);
    }
}

impl Drop for BreakerCall {
    fn drop(&mut self) {
        if !self.reported {
            self.breaker.release(self.admission);
        }
    }
}

pub struct ProxyRouter {
    gateway: Arc<GatewayService>,
    http_client: Arc<dyn HttpClient>,
    request_id_header: HeaderName,
    service_header: HeaderName,
    timeout: Duration,
}

impl ProxyRouter {
    pub fn new(gateway: Arc<GatewayService>, http_client: Arc<dyn HttpClient>) -> Result<Self> {
        let proxy = &gateway.config().proxy;
        let request_id_header = HeaderName::try_from(proxy.request_id_header.as_str())
            .wrap_err_with(|| format!("Invalid request id header: {}", proxy.request_id_header))?;
        let service_header = HeaderName::try_from(proxy.service_header.as_str())
            .wrap_err_with(|| format!("Invalid service header: {}", proxy.service_header))?;
        let timeout = proxy.timeout();

        Ok(Self {
            gateway,
            http_client,
            request_id_header,
            service_header,
            timeout,
        })
    }

    /// Proxy one inbound request. Never fails; errors become JSON responses.
    /// The correlation id is echoed on every response.
    pub async fn handle(
        &self,
        req: Request<AxumBody>,
        peer: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let request_id = req
            .headers()
            .get(&self.request_id_header)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let span = create_request_span(req.method().as_str(), req.uri().path(), &request_id);
        let start = Instant::now();

        let mut response = match self
            .forward(req, peer, &request_id)
            .instrument(span.clone())
            .await
        {
            Ok(response) => response,
            Err(err) => {
                span.in_scope(|| tracing::info!(error = %err, code = err.code(), "Request rejected"));
                err.into_response()
            }
        };

        span.record("http.status_code", response.status().as_u16());
        span.record("duration_ms", start.elapsed().as_millis() as u64);

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response
                .headers_mut()
                .insert(self.request_id_header.clone(), value);
        }
        response
    }

    async fn forward(
        &self,
        mut req: Request<AxumBody>,
        peer: Option<SocketAddr>,
        request_id: &str,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let service = self.gateway.resolve_service(req.uri().path())?.to_string();
        let method = req.method().clone();
        let span = tracing::Span::current();
        span.record("service", service.as_str());
        let _timer = RequestTimer::new(&service, method.as_str());

        let instance = self
            .gateway
            .select_instance(&service)
            .inspect_err(|e| increment_rejected_request(&service, e.code()))?;

        let breaker = self.gateway.breaker(&service).await;
        let Some(admission) = breaker.can_execute() else {
            increment_rejected_request(&service, "circuit_open");
            return Err(GatewayError::CircuitOpen(service));
        };
        let call = BreakerCall::new(breaker, admission);
        span.record("instance.id", instance.id.as_str());

        self.rewrite_request(&mut req, &instance, &service, request_id, peer)?;

        match self.http_client.send_request(req, self.timeout).await {
            Ok(response) if response.status().is_server_error() => {
                call.failure();
                tracing::warn!(
                    instance.id = %instance.id,
                    status = %response.status(),
                    "Upstream answered with a server error"
                );
                increment_upstream_failure(&service, "status");
                increment_request_total(&service, method.as_str(), 502);
                Err(GatewayError::BadGateway(service))
            }
            Ok(response) => {
                call.success();
                increment_request_total(&service, method.as_str(), response.status().as_u16());
                Ok(response)
            }
            Err(HttpClientError::Timeout(after)) => {
                call.failure();
                tracing::warn!(instance.id = %instance.id, ?after, "Upstream timed out");
                increment_upstream_failure(&service, "timeout");
                increment_request_total(&service, method.as_str(), 502);
                Err(GatewayError::UpstreamTimeout(service))
            }
            Err(HttpClientError::InvalidRequest(reason)) => {
                // Not the upstream's fault; the admission is released on drop
                tracing::error!(instance.id = %instance.id, %reason, "Could not build upstream request");
                drop(call);
                Err(GatewayError::Internal)
            }
            Err(e) => {
                call.failure();
                tracing::warn!(instance.id = %instance.id, error = %e, "Upstream call failed");
                increment_upstream_failure(&service, "transport");
                increment_request_total(&service, method.as_str(), 502);
                Err(GatewayError::BadGateway(service))
            }
        }
    }

    /// Retarget the request at `instance` and add the forwarding headers.
    fn rewrite_request(
        &self,
        req: &mut Request<AxumBody>,
        instance: &ServiceInstance,
        service: &str,
        request_id: &str,
        peer: Option<SocketAddr>,
    ) -> Result<(), GatewayError> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let target: Uri = format!("{}{}", instance.base_url(), path_and_query)
            .parse()
            .map_err(|e| {
                tracing::error!(instance.id = %instance.id, error = %e, "Invalid upstream URI");
                GatewayError::Internal
            })?;
        *req.uri_mut() = target;

        let headers = req.headers_mut();

        if let Some(host) = headers.get(header::HOST).cloned() {
            headers.insert(X_FORWARDED_HOST, host);
        }

        if let Some(peer) = peer {
            let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{existing}, {}", peer.ip()),
                None => peer.ip().to_string(),
            };
            if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
                headers.insert(X_FORWARDED_FOR, value);
            }
        }

        if let Ok(value) = HeaderValue::from_str(request_id) {
            headers.insert(self.request_id_header.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(service) {
            headers.insert(self.service_header.clone(), value);
        }

        Ok(())
    }
}
