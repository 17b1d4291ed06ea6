pub mod health_checker;
pub mod http_client;
pub mod http_handler;
pub mod middleware;
pub mod proxy;

/// Re-export commonly used types from adapters
pub use health_checker::{HealthCheckHandle, HealthChecker};
pub use http_client::HttpClientAdapter;
pub use http_handler::HttpHandler;
pub use middleware::*;
pub use proxy::ProxyRouter;
