//! Metrics sampled by the autoscale monitor and exposed for `shouldDowngrade`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Rolling counters a pool exposes for autoscale decisions and diagnostics.
///
/// Latency and CPU are tracked as simple running sums/counts rather than a
/// histogram; the autoscale policy only needs an average.
#[derive(Default)]
pub struct WorkerMetrics {
    latency_sum_micros: AtomicU64,
    latency_count: AtomicU64,
    error_count: AtomicU64,
    max_latency_micros: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_latency(&self, micros: u64) {
        self.latency_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
        self.max_latency_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Average processing latency, milliseconds. `0.0` if no samples yet.
    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.latency_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        let sum = self.latency_sum_micros.load(Ordering::Relaxed);
        (sum as f64 / count as f64) / 1000.0
    }

    /// Maximum observed latency, milliseconds, since the last reset.
    pub fn max_latency_ms(&self) -> f64 {
        self.max_latency_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Resets the rolling window. Called by the autoscale monitor after
    /// each sample so each 10s window reflects only recent load.
    pub fn reset_window(&self) {
        self.latency_sum_micros.store(0, Ordering::Relaxed);
        self.latency_count.store(0, Ordering::Relaxed);
        self.max_latency_micros.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_latency_across_samples() {
        let m = WorkerMetrics::new();
        m.record_latency(1000);
        m.record_latency(3000);
        assert_eq!(m.avg_latency_ms(), 2.0);
        assert_eq!(m.max_latency_ms(), 3.0);
    }

    #[test]
    fn reset_window_clears_samples() {
        let m = WorkerMetrics::new();
        m.record_latency(5000);
        m.reset_window();
        assert_eq!(m.avg_latency_ms(), 0.0);
    }
}
