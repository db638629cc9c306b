//! Sampled, rate-limited error reporting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn report(&self, message: &str, code: &str);
}

/// Logs via `tracing` — the default sink when no external one is wired up.
pub struct TracingErrorSink;

#[async_trait]
impl ErrorSink for TracingErrorSink {
    async fn report(&self, message: &str, code: &str) {
        tracing::error!(target: "reliability", code, "{message}");
    }
}

pub struct ErrorReporter {
    sink: Box<dyn ErrorSink>,
    sample_rate: f64,
    max_per_minute: u32,
    recent_emits: Mutex<VecDeque<Instant>>,
}

impl ErrorReporter {
    pub fn new(sink: Box<dyn ErrorSink>, sample_rate: f64, max_per_minute: u32) -> Self {
        Self {
            sink,
            sample_rate: sample_rate.clamp(0.0, 1.0),
            max_per_minute,
            recent_emits: Mutex::new(VecDeque::new()),
        }
    }

    /// Report an error if it survives sampling and the per-minute cap.
    /// Returns whether it was actually emitted.
    pub async fn report(&self, message: &str, code: &str) -> bool {
        if self.sample_rate < 1.0 && rand::random::<f64>() > self.sample_rate {
            return false;
        }
        {
            let mut recent = self.recent_emits.lock();
            let cutoff = Instant::now() - Duration::from_secs(60);
            while recent.front().is_some_and(|t| *t < cutoff) {
                recent.pop_front();
            }
            if recent.len() as u32 >= self.max_per_minute {
                return false;
            }
            recent.push_back(Instant::now());
        }
        self.sink.report(message, code).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicUsize>);

    #[async_trait]
    impl ErrorSink for CountingSink {
        async fn report(&self, _message: &str, _code: &str) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn rate_limit_caps_emissions_per_minute() {
        let count = Arc::new(AtomicUsize::new(0));
        let reporter = ErrorReporter::new(Box::new(CountingSink(count.clone())), 1.0, 2);
        for _ in 0..5 {
            reporter.report("boom", "write_error").await;
        }
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn zero_sample_rate_emits_nothing() {
        let count = Arc::new(AtomicUsize::new(0));
        let reporter = ErrorReporter::new(Box::new(CountingSink(count.clone())), 0.0, 100);
        reporter.report("boom", "write_error").await;
        assert_eq!(count.load(Ordering::Relaxed), 0);
    }
}
