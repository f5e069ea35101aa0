// Metrics collection and tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// How many latency samples to retain for percentiles
const LATENCY_SAMPLE_CAP: usize = 1000;

/// Per-endpoint request/latency counters
#[derive(Debug, Default)]
pub struct EndpointMetrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    latency_samples: Mutex<Vec<u64>>,
}

impl EndpointMetrics {
    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let mut current_max = self.max_latency_ms.load(Ordering::Relaxed);
        while latency_ms > current_max {
            match self.max_latency_ms.compare_exchange_weak(
                current_max,
                latency_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() >= LATENCY_SAMPLE_CAP {
                samples.remove(0);
            }
            samples.push(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn percentile(&self, p: u8) -> u64 {
        if let Ok(samples) = self.latency_samples.lock() {
            if samples.is_empty() {
                return 0;
            }
            let mut sorted = samples.clone();
            sorted.sort_unstable();
            let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
            sorted[index]
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> EndpointStats {
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
        }
    }
}

/// Analysis-specific counters
#[derive(Debug, Default)]
pub struct AnalysisMetrics {
    clips_analyzed: AtomicU64,
    total_hits: AtomicU64,
    total_analysis_time_ms: AtomicU64,
}

impl AnalysisMetrics {
    pub fn record_analysis(&self, time_ms: u64, hits: usize) {
        self.clips_analyzed.fetch_add(1, Ordering::Relaxed);
        self.total_hits.fetch_add(hits as u64, Ordering::Relaxed);
        self.total_analysis_time_ms
            .fetch_add(time_ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AnalysisStats {
        let clips = self.clips_analyzed.load(Ordering::Relaxed);
        let total_ms = self.total_analysis_time_ms.load(Ordering::Relaxed);
        AnalysisStats {
            clips_analyzed: clips,
            total_hits: self.total_hits.load(Ordering::Relaxed),
            avg_analysis_time_ms: if clips == 0 {
                0.0
            } else {
                total_ms as f64 / clips as f64
            },
        }
    }
}

/// All counters the server tracks
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub upload: EndpointMetrics,
    pub link: EndpointMetrics,
    pub analysis: AnalysisMetrics,
}

#[derive(Serialize)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
}

#[derive(Serialize)]
pub struct AnalysisStats {
    pub clips_analyzed: u64,
    pub total_hits: u64,
    pub avg_analysis_time_ms: f64,
}

#[derive(Serialize)]
pub struct SystemStats {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemStats,
    pub upload: EndpointStats,
    pub link: EndpointStats,
    pub analysis: AnalysisStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_counts() {
        let metrics = EndpointMetrics::default();
        metrics.record_request(10);
        metrics.record_request(30);
        metrics.record_error();

        let stats = metrics.snapshot();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.max_latency_ms, 30);
        assert!((stats.avg_latency_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_endpoint_metrics_empty() {
        let stats = EndpointMetrics::default().snapshot();
        assert_eq!(stats.request_count, 0);
        assert_eq!(stats.avg_latency_ms, 0.0);
        assert_eq!(stats.p95_latency_ms, 0);
    }

    #[test]
    fn test_analysis_metrics() {
        let metrics = AnalysisMetrics::default();
        metrics.record_analysis(100, 8);
        metrics.record_analysis(200, 4);

        let stats = metrics.snapshot();
        assert_eq!(stats.clips_analyzed, 2);
        assert_eq!(stats.total_hits, 12);
        assert!((stats.avg_analysis_time_ms - 150.0).abs() < f64::EPSILON);
    }
}
