//! Threshold-breach alerts.

use crate::config::AlertThresholds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    fn breach(metric: &str, value: f64, threshold: f64) -> Self {
        Self {
            severity: if value >= threshold * 1.5 { AlertSeverity::Critical } else { AlertSeverity::Warning },
            metric: metric.to_string(),
            value,
            threshold,
            timestamp: Utc::now(),
        }
    }
}

/// One telemetry snapshot's worth of metrics, evaluated against the
/// configured thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricSnapshot {
    pub queue_depth: usize,
    pub latency_p95_ms: f64,
    pub error_rate: f64,
    pub memory_usage_mb: f64,
    pub throughput_loc_per_min: f64,
}

/// Evaluate a snapshot against thresholds, emitting one alert per breach.
/// Throughput is an inverted check: alert when *below* the minimum.
pub fn evaluate(snapshot: &MetricSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if snapshot.queue_depth as f64 > thresholds.queue_depth as f64 {
        alerts.push(Alert::breach("queue_depth", snapshot.queue_depth as f64, thresholds.queue_depth as f64));
    }
    if snapshot.latency_p95_ms > thresholds.latency_p95_ms {
        alerts.push(Alert::breach("latency_p95_ms", snapshot.latency_p95_ms, thresholds.latency_p95_ms));
    }
    if snapshot.error_rate > thresholds.error_rate {
        alerts.push(Alert::breach("error_rate", snapshot.error_rate, thresholds.error_rate));
    }
    if snapshot.memory_usage_mb > thresholds.memory_usage_mb {
        alerts.push(Alert::breach("memory_usage_mb", snapshot.memory_usage_mb, thresholds.memory_usage_mb));
    }
    if snapshot.throughput_loc_per_min < thresholds.throughput_loc_per_min {
        alerts.push(Alert::breach(
            "throughput_loc_per_min",
            thresholds.throughput_loc_per_min - snapshot.throughput_loc_per_min,
            0.0,
        ));
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> AlertThresholds {
        AlertThresholds {
            queue_depth: 100,
            latency_p95_ms: 500.0,
            error_rate: 0.05,
            memory_usage_mb: 1024.0,
            throughput_loc_per_min: 1000.0,
        }
    }

    #[test]
    fn no_alerts_when_under_every_threshold() {
        let snapshot = MetricSnapshot {
            queue_depth: 10,
            latency_p95_ms: 100.0,
            error_rate: 0.01,
            memory_usage_mb: 200.0,
            throughput_loc_per_min: 2000.0,
        };
        assert!(evaluate(&snapshot, &thresholds()).is_empty());
    }

    #[test]
    fn breaching_queue_depth_emits_alert() {
        let snapshot = MetricSnapshot { queue_depth: 9_000, ..Default::default() };
        let alerts = evaluate(&snapshot, &thresholds());
        assert!(alerts.iter().any(|a| a.metric == "queue_depth" && a.severity == AlertSeverity::Critical));
    }

    #[test]
    fn throughput_below_minimum_emits_alert() {
        let snapshot = MetricSnapshot { throughput_loc_per_min: 10.0, ..Default::default() };
        let alerts = evaluate(&snapshot, &thresholds());
        assert!(alerts.iter().any(|a| a.metric == "throughput_loc_per_min"));
    }
}
