pub mod graceful_shutdown;
pub mod health_supervisor;

pub use graceful_shutdown::{GracefulShutdown, ShutdownReason, ShutdownToken};
pub use health_supervisor::HealthCheckSupervisor;
