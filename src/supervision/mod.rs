//! Component supervision: circuit breakers and health polling

pub mod circuit_breaker;
pub mod health;

pub use circuit_breaker::{
    BreakerGate, BreakerStateCounts, CircuitBreaker, CircuitBreakerManager, CircuitState,
};
pub use health::{
    probe_fn, HealthCheck, HealthCheckResult, HealthCheckScheduler, HealthCheckSnapshot,
    HealthProbe, HealthStatus,
};
