//! Retry handler.

use crate::config::RetryConfig;
use crate::error::message_looks_retryable;

/// Whether an error should be retried: tagged retryable, or its message
/// matches a configured substring.
pub fn is_retryable(is_tagged_retryable: bool, message: &str, config: &RetryConfig) -> bool {
    if is_tagged_retryable || message_looks_retryable(message) {
        return true;
    }
    let lower = message.to_lowercase();
    config.retryable_errors.iter().any(|s| lower.contains(&s.to_lowercase()))
}

/// Exponential backoff with jitter, reusing the same shape as C4's queue
/// backoff.
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig) -> u64 {
    crate::queue::backoff_with_jitter(
        attempt,
        config.base_delay_ms,
        config.max_delay_ms,
        config.backoff_multiplier,
        config.jitter_factor,
    )
}

/// Retry an async call up to `config.max_attempts`, using `classify` to
/// decide whether a given error is retryable.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut call: F, classify: impl Fn(&E) -> bool) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt + 1 >= config.max_attempts || !classify(&err) {
                    return Err(err);
                }
                let delay = backoff_delay_ms(attempt, config);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            retryable_errors: vec!["flaky".to_string()],
        }
    }

    #[test]
    fn substring_matches_configured_retryable_list() {
        assert!(is_retryable(false, "upstream is flaky today", &cfg()));
        assert!(!is_retryable(false, "permanently broken", &cfg()));
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_cap() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with_backoff(
            &cfg(),
            || {
                let n = attempts.fetch_add(1, Ordering::Relaxed);
                async move { if n < 2 { Err("timeout") } else { Ok(42) } }
            },
            |_| true,
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn gives_up_when_error_is_not_retryable() {
        let result: Result<u32, &str> = retry_with_backoff(&cfg(), || async { Err("fatal") }, |_| false).await;
        assert_eq!(result, Err("fatal"));
    }
}
