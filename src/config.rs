//! Layered configuration for the ingestion pipeline.
//!
//! Supports defaults, a TOML config file, and `ING_`-prefixed environment
//! variable overrides with double-underscore nesting, e.g.
//! `ING_QUEUE__PARTITION_COUNT=8` sets `queue.partition_count`.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub error: ErrorConfig,
    #[serde(default)]
    pub fanout: FanoutConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: WorkersConfig::default(),
            batching: BatchingConfig::default(),
            queue: QueueConfig::default(),
            monitoring: MonitoringConfig::default(),
            error: ErrorConfig::default(),
            fanout: FanoutConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// `{parsers, entityWorkers, relationshipWorkers, embeddingWorkers}` or a
/// total `{min, max}` under auto-scale rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkersConfig {
    pub min: usize,
    pub max: usize,
    pub scale_up_queue_depth: usize,
    pub scale_down_idle_ratio: f64,
    pub scale_cooldown_ms: u64,
    pub consecutive_error_restart_threshold: u32,
    pub task_timeout_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            min: 2,
            max: num_cpus_fallback(),
            scale_up_queue_depth: 100,
            scale_down_idle_ratio: 0.25,
            scale_cooldown_ms: 5_000,
            consecutive_error_restart_threshold: 5,
            task_timeout_ms: 30_000,
        }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// `{entityBatchSize, relationshipBatchSize, embeddingBatchSize, timeoutMs,
/// maxConcurrentBatches}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchingConfig {
    pub entity_batch_size: usize,
    pub relationship_batch_size: usize,
    pub embedding_batch_size: usize,
    pub timeout_ms: u64,
    pub max_concurrent_batches: usize,
    pub idempotency_ttl_secs: u64,
    pub epoch_ttl_secs: u64,
    pub max_batch_retry_attempts: u32,
    pub per_item_retry_threshold: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            entity_batch_size: 200,
            relationship_batch_size: 500,
            embedding_batch_size: 50,
            timeout_ms: 2_000,
            max_concurrent_batches: 4,
            idempotency_ttl_secs: 300,
            epoch_ttl_secs: 3_600,
            max_batch_retry_attempts: 5,
            per_item_retry_threshold: 10,
        }
    }
}

/// `{maxSize, partitionCount, batchSize, batchTimeout, retryAttempts,
/// retryDelay, backpressureThreshold, partitionStrategy}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    pub max_size: usize,
    pub partition_count: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_jitter_fraction: f64,
    pub backpressure_threshold: usize,
    pub partition_strategy: PartitionStrategy,
    pub scheduled_sweep_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            partition_count: 4,
            batch_size: 64,
            batch_timeout_ms: 500,
            retry_attempts: 5,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 30_000,
            retry_multiplier: 2.0,
            retry_jitter_fraction: 0.2,
            backpressure_threshold: 8_000,
            partition_strategy: PartitionStrategy::Hash,
            scheduled_sweep_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    Hash,
    RoundRobin,
    Priority,
}

/// `{metricsInterval, healthCheckInterval, alertThresholds}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub metrics_interval_ms: u64,
    pub health_check_interval_ms: u64,
    pub alert_thresholds: AlertThresholds,
    pub rolling_window_samples: usize,
    pub error_tail_len: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: 5_000,
            health_check_interval_ms: 10_000,
            alert_thresholds: AlertThresholds::default(),
            rolling_window_samples: 1_000,
            error_tail_len: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    pub queue_depth: usize,
    pub latency_p95_ms: f64,
    pub error_rate: f64,
    pub memory_usage_mb: f64,
    pub throughput_loc_per_min: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            queue_depth: 8_000,
            latency_p95_ms: 2_000.0,
            error_rate: 0.1,
            memory_usage_mb: 4_096.0,
            throughput_loc_per_min: 1.0,
        }
    }
}

/// Retry/circuit/DLQ config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorConfig {
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub dlq: DlqConfig,
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit: CircuitConfig::default(),
            dlq: DlqConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            retryable_errors: crate::error::RETRYABLE_SUBSTRINGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
    pub monitoring_window_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            monitoring_window_ms: 60_000,
            success_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqConfig {
    pub enabled: bool,
    pub max_size: usize,
    pub retention_secs: u64,
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 1_000,
            retention_secs: 7 * 24 * 3_600,
        }
    }
}

/// Per-connection backpressure and heartbeat tuning for C10.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutConfig {
    pub send_buffer_threshold_bytes: usize,
    pub throttle_retry_delay_ms: u64,
    pub max_consecutive_throttles: u32,
    pub heartbeat_grace_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub idle_sweep_threshold_ms: u64,
    pub required_scope: String,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            send_buffer_threshold_bytes: 512 * 1024,
            throttle_retry_delay_ms: 100,
            max_consecutive_throttles: 5,
            heartbeat_grace_ms: 15_000,
            heartbeat_timeout_ms: 30_000,
            idle_sweep_threshold_ms: 60_000,
            required_scope: "graph:read".to_string(),
        }
    }
}

/// Per-module log level overrides, consumed by `logging::init_with_config`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: std::collections::HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: std::collections::HashMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Settings {
    /// Load configuration from defaults, an optional TOML file, then
    /// `ING_`-prefixed environment overrides, in that precedence order.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, figment::Error> {
        let path = config_path.unwrap_or_else(|| PathBuf::from("ingest.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ING_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_figment() {
        let settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .extract::<Settings>()
            .expect("defaults should extract cleanly");
        assert_eq!(settings.queue.partition_count, 4);
        assert_eq!(settings.workers.min, 2);
    }
}
