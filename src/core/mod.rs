pub mod circuit_breaker;
pub mod error;
pub mod gateway;
pub mod health_monitor;
pub mod instance;
pub mod load_balancer;
pub mod registry;
pub mod routes;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use error::GatewayError;
pub use gateway::GatewayService;
pub use health_monitor::{HealthMonitor, HealthReport, OverallStatus};
pub use instance::{HealthStatus, InstanceId, RegistrationError, ServiceInstance};
pub use load_balancer::LoadBalancerFactory;
pub use registry::ServiceRegistry;
pub use routes::RouteTable;
