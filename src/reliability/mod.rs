//! Error & Retry Layer (C7) — retry handler, circuit breaker, dead-letter
//! queue, error reporter, and a custom-handler registry.

pub mod circuit_breaker;
pub mod dead_letter;
pub mod error_reporter;
pub mod retry;

use crate::config::ErrorConfig;
use circuit_breaker::CircuitBreaker;
use dead_letter::DeadLetterQueue;
use error_reporter::{ErrorReporter, ErrorSink, TracingErrorSink};
use std::collections::HashMap;
use std::sync::Arc;

/// A custom handler for a named error kind. If it claims the error
/// (`handled: true`), no default retry/DLQ policy runs.
pub trait CustomErrorHandler: Send + Sync {
    fn handle(&self, kind: &str, message: &str) -> bool;
}

#[derive(Default)]
pub struct CustomHandlerRegistry {
    handlers: HashMap<String, Arc<dyn CustomErrorHandler>>,
}

impl CustomHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn CustomErrorHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    /// Dispatch to a registered handler for `kind`, if any. Returns
    /// `Some(true)` if a handler claimed the error, `Some(false)` if a
    /// handler ran but declined, `None` if no handler is registered.
    pub fn dispatch(&self, kind: &str, message: &str) -> Option<bool> {
        self.handlers.get(kind).map(|h| h.handle(kind, message))
    }
}

/// Bundles the reliability primitives the rest of the pipeline shares.
pub struct ReliabilityLayer {
    pub config: ErrorConfig,
    pub circuit_breaker: CircuitBreaker,
    pub dead_letter_queue: DeadLetterQueue,
    pub error_reporter: ErrorReporter,
    pub custom_handlers: CustomHandlerRegistry,
}

impl ReliabilityLayer {
    pub fn new(config: ErrorConfig) -> Self {
        Self::with_error_sink(config, Box::new(TracingErrorSink))
    }

    pub fn with_error_sink(config: ErrorConfig, sink: Box<dyn ErrorSink>) -> Self {
        let circuit_breaker = CircuitBreaker::new(config.circuit.clone());
        let dead_letter_queue = DeadLetterQueue::new(config.dlq.clone());
        // Default sampling: report everything, capped at 60/min, until the
        // orchestrator wires a monitoring-config-driven reporter in.
        let error_reporter = ErrorReporter::new(sink, 1.0, 60);
        Self {
            config,
            circuit_breaker,
            dead_letter_queue,
            error_reporter,
            custom_handlers: CustomHandlerRegistry::new(),
        }
    }

    /// Decide whether an error should be retried, honoring the custom
    /// handler registry first.
    pub fn should_retry(&self, kind: &str, message: &str, is_tagged_retryable: bool) -> bool {
        if let Some(handled) = self.custom_handlers.dispatch(kind, message) {
            if handled {
                return false;
            }
        }
        retry::is_retryable(is_tagged_retryable, message, &self.config.retry)
    }
}
