//! Circuit breaker.
//!
//! States: closed (normal), open (fail fast), half-open (probing). Ported
//! from the same closed/open/half-open state machine used by the
//! platform's API gateway, generalized to wrap any fallible async call.

use crate::config::CircuitConfig;
use crate::error::ReliabilityError;
use parking_lot::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    config: CircuitConfig,
    state: RwLock<CircuitState>,
    failures: RwLock<u32>,
    successes: RwLock<u32>,
    last_transition: RwLock<Instant>,
    window_start: RwLock<Instant>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            failures: RwLock::new(0),
            successes: RwLock::new(0),
            last_transition: RwLock::new(now),
            window_start: RwLock::new(now),
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    /// Check whether a call is allowed through right now. Transitions
    /// Open -> HalfOpen as a side effect once the reset timeout elapses.
    pub fn is_call_allowed(&self) -> Result<(), ReliabilityError> {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = self.last_transition.read().elapsed();
                if elapsed >= Duration::from_millis(self.config.reset_timeout_ms) {
                    self.transition_to(CircuitState::HalfOpen);
                    Ok(())
                } else {
                    Err(ReliabilityError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => *self.failures.write() = 0,
            CircuitState::HalfOpen => {
                let mut successes = self.successes.write();
                *successes += 1;
                if *successes >= self.config.success_threshold {
                    drop(successes);
                    self.transition_to(CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let window_elapsed = self.window_start.read().elapsed();
        if window_elapsed >= Duration::from_millis(self.config.monitoring_window_ms) {
            *self.window_start.write() = Instant::now();
            *self.failures.write() = 0;
        }

        match self.state() {
            CircuitState::Closed => {
                let mut failures = self.failures.write();
                *failures += 1;
                if *failures >= self.config.failure_threshold {
                    drop(failures);
                    self.transition_to(CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn transition_to(&self, new_state: CircuitState) {
        tracing::info!(target: "reliability", "circuit breaker {:?} -> {:?}", self.state(), new_state);
        *self.state.write() = new_state;
        *self.failures.write() = 0;
        *self.successes.write() = 0;
        *self.last_transition.write() = Instant::now();
    }

    /// Run a fallible async call through the breaker, recording the outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, ReliabilityError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.is_call_allowed()?;
        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(_) => {
                self.record_failure();
                Err(ReliabilityError::CircuitOpen)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 2,
            reset_timeout_ms: 10,
            monitoring_window_ms: 10_000,
            success_threshold: 2,
        }
    }

    #[test]
    fn opens_after_failure_threshold() {
        let cb = CircuitBreaker::new(cfg());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_call_allowed().is_err());
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new(cfg());
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        assert!(cb.is_call_allowed().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new(cfg());
        cb.record_failure();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(15));
        cb.is_call_allowed().unwrap();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
