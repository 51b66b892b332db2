// Middleware for resilient engine calls
//
// Provides circuit breaking in front of the external identification and
// translation services

pub mod circuit_breaker;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
