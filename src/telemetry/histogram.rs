//! Rolling-window latency histogram.
//!
//! A fixed-capacity ring buffer of recent samples (default 1000) per
//! operation type, from which avg/p50/p95/p99/min/max are derived on read.

use std::collections::VecDeque;

pub struct RollingHistogram {
    capacity: usize,
    samples: VecDeque<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub avg: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
}

impl RollingHistogram {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn record(&mut self, value_ms: f64) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn stats(&self) -> LatencyStats {
        if self.samples.is_empty() {
            return LatencyStats::default();
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = sorted.len();
        let percentile = |p: f64| -> f64 {
            let idx = ((p * n as f64).ceil() as usize).saturating_sub(1).min(n - 1);
            sorted[idx]
        };
        LatencyStats {
            count: n,
            avg: sorted.iter().sum::<f64>() / n as f64,
            p50: percentile(0.50),
            p95: percentile(0.95),
            p99: percentile(0.99),
            min: sorted[0],
            max: sorted[n - 1],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_sample_past_capacity() {
        let mut h = RollingHistogram::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            h.record(v);
        }
        assert_eq!(h.len(), 3);
        let stats = h.stats();
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn percentiles_on_uniform_samples() {
        let mut h = RollingHistogram::new(100);
        for v in 1..=100 {
            h.record(v as f64);
        }
        let stats = h.stats();
        assert_eq!(stats.p50, 50.0);
        assert_eq!(stats.p99, 99.0);
        assert_eq!(stats.max, 100.0);
    }
}
