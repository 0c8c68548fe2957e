use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the service.
///
/// Tracks request outcomes, hazard counts per category, and request latency.
/// Thread-safe and cheap to clone across handlers.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    requests_total: AtomicUsize,
    requests_success: AtomicUsize,
    requests_failed: AtomicUsize,
    hazards_detected: AtomicUsize,
    request_latency_ms: RwLock<Vec<u64>>,

    // Per-category hazard counters
    category_counters: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                requests_total: AtomicUsize::new(0),
                requests_success: AtomicUsize::new(0),
                requests_failed: AtomicUsize::new(0),
                hazards_detected: AtomicUsize::new(0),
                request_latency_ms: RwLock::new(Vec::new()),
                category_counters: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_request(&self, success: bool, duration: Duration) {
        self.inner.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.inner.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.inner
            .request_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_hazard(&self, category: &str) {
        self.inner.hazards_detected.fetch_add(1, Ordering::Relaxed);
        self.inner
            .category_counters
            .entry(category.to_string())
            .or_insert_with(|| AtomicUsize::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    // Get snapshot for reporting
    pub fn snapshot(&self) -> MetricsSnapshot {
        let latency = self.inner.request_latency_ms.read();
        let latency_avg = avg(&latency);
        let latency_p50 = percentile(&latency, 0.5);
        let latency_p95 = percentile(&latency, 0.95);
        let latency_p99 = percentile(&latency, 0.99);
        drop(latency);

        let hazards_by_category = self
            .inner
            .category_counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            requests_total: self.inner.requests_total.load(Ordering::Relaxed),
            requests_success: self.inner.requests_success.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            hazards_detected: self.inner.hazards_detected.load(Ordering::Relaxed),
            hazards_by_category,
            request_latency_avg_ms: latency_avg,
            request_latency_p50_ms: latency_p50,
            request_latency_p95_ms: latency_p95,
            request_latency_p99_ms: latency_p99,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Generate Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();

        let mut category_lines = String::new();
        for (category, count) in &snapshot.hazards_by_category {
            category_lines.push_str(&format!(
                "hazards_by_category_total {{category=\"{}\"}} {}\n",
                category, count
            ));
        }

        format!(
            r#"# HELP detect_requests_total Total number of detect requests
# TYPE detect_requests_total counter
detect_requests_total {{}} {}

# HELP detect_requests_success Number of successful detect requests
# TYPE detect_requests_success counter
detect_requests_success {{}} {}

# HELP detect_requests_failed Number of failed detect requests
# TYPE detect_requests_failed counter
detect_requests_failed {{}} {}

# HELP hazards_detected_total Total number of hazards detected
# TYPE hazards_detected_total counter
hazards_detected_total {{}} {}

# HELP hazards_by_category_total Hazards detected per category
# TYPE hazards_by_category_total counter
{}
# HELP request_latency_avg_ms Average request latency in milliseconds
# TYPE request_latency_avg_ms gauge
request_latency_avg_ms {{}} {}

# HELP uptime_seconds Application uptime in seconds
# TYPE uptime_seconds counter
uptime_seconds {{}} {}
"#,
            snapshot.requests_total,
            snapshot.requests_success,
            snapshot.requests_failed,
            snapshot.hazards_detected,
            category_lines,
            snapshot.request_latency_avg_ms,
            snapshot.uptime_seconds,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests_total: usize,
    pub requests_success: usize,
    pub requests_failed: usize,
    pub hazards_detected: usize,
    pub hazards_by_category: HashMap<String, usize>,
    pub request_latency_avg_ms: u64,
    pub request_latency_p50_ms: u64,
    pub request_latency_p95_ms: u64,
    pub request_latency_p99_ms: u64,
    pub uptime_seconds: u64,
}

fn percentile(values: &[u64], p: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let idx = ((values.len() as f64 - 1.0) * p) as usize;
    sorted[idx]
}

fn avg(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.iter().sum::<u64>() / values.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = Metrics::new();

        metrics.record_request(true, Duration::from_millis(100));
        metrics.record_request(false, Duration::from_millis(50));
        metrics.record_hazard("accident");
        metrics.record_hazard("accident");
        metrics.record_hazard("pothole");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.requests_failed, 1);
        assert_eq!(snapshot.hazards_detected, 3);
        assert_eq!(snapshot.hazards_by_category["accident"], 2);
        assert_eq!(snapshot.hazards_by_category["pothole"], 1);
        assert_eq!(snapshot.request_latency_avg_ms, 75);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_request(true, Duration::from_millis(100));
        metrics.record_hazard("debris");

        let prometheus = metrics.to_prometheus();
        assert!(prometheus.contains("detect_requests_total {} 1"));
        assert!(prometheus.contains("hazards_by_category_total {category=\"debris\"} 1"));
    }

    #[test]
    fn test_empty_snapshot_is_all_zeroes() {
        let snapshot = Metrics::new().snapshot();
        assert_eq!(snapshot.requests_total, 0);
        assert_eq!(snapshot.request_latency_p99_ms, 0);
        assert!(snapshot.hazards_by_category.is_empty());
    }
}
