//! Telemetry (C8) — rolling latency windows, throughput counters, resource
//! samples, a recent-error tail, and threshold alerts.

pub mod alerts;
pub mod histogram;

use crate::config::MonitoringConfig;
use alerts::{Alert, MetricSnapshot};
use chrono::{DateTime, Utc};
use histogram::{LatencyStats, RollingHistogram};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{Pid, ProcessRefreshKind, System};

#[derive(Debug, Clone)]
pub struct ErrorTailEntry {
    pub message: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

/// Monotonic throughput counters for one unit kind, reset on each rollup
/// read so callers get "this window's" count, not a lifetime total.
#[derive(Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

#[derive(Default)]
struct ThroughputCounters {
    files: Counter,
    entities: Counter,
    relationships: Counter,
    lines_of_code: Counter,
    bytes: Counter,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThroughputSnapshot {
    pub files: u64,
    pub entities: u64,
    pub relationships: u64,
    pub lines_of_code: u64,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceSample {
    pub memory_mb: f64,
    pub heap_mb: f64,
    pub gc_pause_ms: f64,
}

pub struct Telemetry {
    config: MonitoringConfig,
    latencies: Mutex<HashMap<String, RollingHistogram>>,
    throughput: ThroughputCounters,
    error_tail: Mutex<VecDeque<ErrorTailEntry>>,
    system: Mutex<System>,
    pid: Pid,
}

impl Telemetry {
    pub fn new(config: MonitoringConfig) -> Self {
        let system = System::new();
        let pid = Pid::from_u32(std::process::id());
        Self {
            config,
            latencies: Mutex::new(HashMap::new()),
            throughput: ThroughputCounters::default(),
            error_tail: Mutex::new(VecDeque::new()),
            system: Mutex::new(system),
            pid,
        }
    }

    pub fn record_latency(&self, operation: &str, duration_ms: f64) {
        let mut latencies = self.latencies.lock();
        latencies
            .entry(operation.to_string())
            .or_insert_with(|| RollingHistogram::new(self.config.rolling_window_samples))
            .record(duration_ms);
    }

    pub fn latency_stats(&self, operation: &str) -> LatencyStats {
        self.latencies
            .lock()
            .get(operation)
            .map(|h| h.stats())
            .unwrap_or_default()
    }

    pub fn record_throughput(&self, files: u64, entities: u64, relationships: u64, lines_of_code: u64, bytes: u64) {
        self.throughput.files.add(files);
        self.throughput.entities.add(entities);
        self.throughput.relationships.add(relationships);
        self.throughput.lines_of_code.add(lines_of_code);
        self.throughput.bytes.add(bytes);
    }

    /// Drain this window's throughput counters (called on a fixed interval
    /// rollup, e.g. once per second or minute).
    pub fn drain_throughput(&self) -> ThroughputSnapshot {
        ThroughputSnapshot {
            files: self.throughput.files.take(),
            entities: self.throughput.entities.take(),
            relationships: self.throughput.relationships.take(),
            lines_of_code: self.throughput.lines_of_code.take(),
            bytes: self.throughput.bytes.take(),
        }
    }

    pub fn record_error(&self, message: impl Into<String>, code: impl Into<String>) {
        let mut tail = self.error_tail.lock();
        if tail.len() >= self.config.error_tail_len {
            tail.pop_front();
        }
        tail.push_back(ErrorTailEntry {
            message: message.into(),
            code: code.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn error_tail(&self) -> Vec<ErrorTailEntry> {
        self.error_tail.lock().iter().cloned().collect()
    }

    /// Sample this process's resident memory via `sysinfo`. Heap and GC
    /// pause figures have no stdlib-accessible source in Rust, so they are
    /// reported as 0 — a faithful gap, not a fabricated measurement.
    pub fn sample_resources(&self) -> ResourceSample {
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            sysinfo::ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let memory_mb = system
            .process(self.pid)
            .map(|p| p.memory() as f64 / (1024.0 * 1024.0))
            .unwrap_or(0.0);
        ResourceSample {
            memory_mb,
            heap_mb: 0.0,
            gc_pause_ms: 0.0,
        }
    }

    pub fn evaluate_alerts(&self, queue_depth: usize, error_rate: f64, throughput_loc_per_min: f64) -> Vec<Alert> {
        let latency_p95_ms = self
            .latencies
            .lock()
            .values()
            .map(|h| h.stats().p95)
            .fold(0.0_f64, f64::max);
        let memory_usage_mb = self.sample_resources().memory_mb;
        let snapshot = MetricSnapshot {
            queue_depth,
            latency_p95_ms,
            error_rate,
            memory_usage_mb,
            throughput_loc_per_min,
        };
        alerts::evaluate(&snapshot, &self.config.alert_thresholds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;

    fn config() -> MonitoringConfig {
        MonitoringConfig {
            metrics_interval_ms: 1000,
            health_check_interval_ms: 5000,
            alert_thresholds: AlertThresholds {
                queue_depth: 100,
                latency_p95_ms: 500.0,
                error_rate: 0.05,
                memory_usage_mb: 4096.0,
                throughput_loc_per_min: 1.0,
            },
            rolling_window_samples: 1000,
            error_tail_len: 100,
        }
    }

    #[test]
    fn throughput_drains_to_zero_after_read() {
        let t = Telemetry::new(config());
        t.record_throughput(1, 2, 3, 100, 4096);
        let snap = t.drain_throughput();
        assert_eq!(snap.entities, 2);
        assert_eq!(t.drain_throughput().entities, 0);
    }

    #[test]
    fn error_tail_bounds_to_configured_length() {
        let mut cfg = config();
        cfg.error_tail_len = 2;
        let t = Telemetry::new(cfg);
        t.record_error("a", "write_error");
        t.record_error("b", "write_error");
        t.record_error("c", "write_error");
        let tail = t.error_tail();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "b");
    }

    #[test]
    fn latency_stats_reflect_recorded_samples() {
        let t = Telemetry::new(config());
        t.record_latency("parse", 10.0);
        t.record_latency("parse", 20.0);
        let stats = t.latency_stats("parse");
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max, 20.0);
    }
}
