use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::utils::Metrics;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are skipped and callers use their local fallback
    Open,
    /// A probe call is let through to see whether the service recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// How long to stay open before probing again
    pub timeout: Duration,
    /// Number of consecutive half-open successes needed to close
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// Fail-fast guard in front of an external engine.
///
/// The pipeline never propagates engine failures, so an open circuit simply
/// means "use the local fallback now" (heuristic language, original text)
/// instead of waiting on a service that keeps failing.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    inner: Arc<RwLock<CircuitBreakerInner>>,
    config: CircuitBreakerConfig,
    metrics: Option<Metrics>,
}

struct CircuitBreakerInner {
    state: CircuitState,
    consecutive_failures: usize,
    consecutive_successes: usize,
    last_failure_time: Option<Instant>,
    total_failures: usize,
    total_successes: usize,
}

impl CircuitBreaker {
    /// Create a breaker for the named service with default thresholds
    pub fn new(name: &'static str) -> Self {
        Self::with_config(name, CircuitBreakerConfig::default())
    }

    pub fn with_config(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            inner: Arc::new(RwLock::new(CircuitBreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure_time: None,
                total_failures: 0,
                total_successes: 0,
            })),
            config,
            metrics: None,
        }
    }

    /// Count trips into the shared metrics
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if the call may proceed, false if the caller should fall back
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.write();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match inner.last_failure_time {
                Some(last_failure) if last_failure.elapsed() >= self.config.timeout => {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    true
                }
                _ => false,
            },
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        inner.total_successes += 1;
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::Open => {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 1;
            }
        }
    }

    pub fn record_failure(&self) {
        let tripped = {
            let mut inner = self.inner.write();
            inner.total_failures += 1;
            inner.consecutive_successes = 0;
            inner.last_failure_time = Some(Instant::now());

            match inner.state {
                CircuitState::Closed => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.failure_threshold {
                        inner.state = CircuitState::Open;
                        true
                    } else {
                        false
                    }
                }
                CircuitState::HalfOpen => {
                    // Probe failed
                    inner.state = CircuitState::Open;
                    inner.consecutive_failures = 1;
                    true
                }
                CircuitState::Open => {
                    inner.consecutive_failures += 1;
                    false
                }
            }
        };

        if tripped {
            warn!("Circuit breaker for {} opened", self.name);
            if let Some(ref m) = self.metrics {
                m.record_circuit_breaker_trip();
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read();
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_failures: inner.total_failures,
            total_successes: inner.total_successes,
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub consecutive_successes: usize,
    pub total_failures: usize,
    pub total_successes: usize,
}
