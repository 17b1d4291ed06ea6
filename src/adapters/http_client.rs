use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use http_body_util::BodyExt;
use hyper::{Request, Response, StatusCode, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;
use tokio::time::timeout;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

const USER_AGENT: &str = concat!("meridian/", env!("CARGO_PKG_VERSION"));

/// Outbound HTTP client built on hyper-util with a rustls connector.
///
/// * Rewrites the `Host` header to the upstream authority
/// * Applies the per-call deadline to response headers
/// * Streams response bodies back without buffering
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    pub fn new() -> Result<Self> {
        // Ignore the error when a provider is already installed
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_nodelay(true);

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();
        for cert in native_certs.certs {
            if root_cert_store.add(cert).is_err() {
                tracing::warn!("Failed to add native certificate to rustls RootCertStore");
            }
        }
        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }
        tracing::debug!("Loaded {} native root certificates", root_cert_store.len());

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build::<_, AxumBody>(https_connector);

        Ok(Self { client })
    }

    /// Point the `Host` header at the upstream and fill in a user agent.
    fn prepare_headers(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let authority = req
            .uri()
            .authority()
            .ok_or_else(|| HttpClientError::InvalidRequest(format!("No authority in {}", req.uri())))?
            .clone();
        let host = HeaderValue::from_str(authority.as_str())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;

        let headers = req.headers_mut();
        headers.insert(header::HOST, host);
        if !headers.contains_key(header::USER_AGENT) {
            headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        }
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
        deadline: Duration,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::prepare_headers(&mut req)?;

        let (mut parts, body) = req.into_parts();
        parts.version = Version::HTTP_11;
        let method = parts.method.clone();
        let uri = parts.uri.clone();

        tracing::debug!(%method, %uri, "Forwarding request upstream");

        let response = match timeout(deadline, self.client.request(Request::from_parts(parts, body))).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(%method, %uri, error = %e, "Upstream request failed");
                return Err(HttpClientError::ConnectionError(format!(
                    "Request to {method} {uri} failed: {e}"
                )));
            }
            Err(_) => {
                tracing::warn!(%method, %uri, ?deadline, "Upstream request timed out");
                return Err(HttpClientError::Timeout(deadline));
            }
        };

        let (mut parts, body) = response.into_parts();
        // Framing is redone by the server side
        parts.headers.remove(header::TRANSFER_ENCODING);
        Ok(Response::from_parts(parts, AxumBody::new(body)))
    }

    async fn probe(&self, url: &str, deadline: Duration) -> HttpClientResult<StatusCode> {
        let mut request = Request::builder()
            .method("GET")
            .uri(url)
            .version(Version::HTTP_11)
            .body(AxumBody::empty())
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
        Self::prepare_headers(&mut request)?;

        let call = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| HttpClientError::ConnectionError(e.to_string()))?;
            let status = response.status();
            // Drain so the connection can return to the pool
            let _ = response.into_body().collect().await;
            Ok::<_, HttpClientError>(status)
        };

        match timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout(deadline)),
        }
    }
}
