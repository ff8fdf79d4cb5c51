//! Metrics and observability utilities
//!
//! Prometheus-style metrics for the retrieval tools and the evidence digest,
//! recorded through the `metrics` facade. Without an installed recorder the
//! helpers are no-ops.

use crate::evidence::AccumulationStats;
use metrics::{counter, describe_counter, describe_histogram, gauge, describe_gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Ragtrail metrics
pub const METRICS_PREFIX: &str = "ragtrail";

/// Buckets for retrieval tool latency (backend round trips, in seconds)
pub const TOOL_LATENCY_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Tool metrics
    describe_counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval tool calls by tool and outcome"
    );

    describe_histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval tool latency in seconds"
    );

    // Evidence metrics
    describe_counter!(
        format!("{}_digests_rendered_total", METRICS_PREFIX),
        Unit::Count,
        "Total evidence digests rendered"
    );

    describe_histogram!(
        format!("{}_digest_items", METRICS_PREFIX),
        Unit::Count,
        "Evidence records per rendered digest"
    );

    describe_gauge!(
        format!("{}_digest_documents", METRICS_PREFIX),
        Unit::Count,
        "Document groups in the last rendered digest"
    );

    describe_counter!(
        format!("{}_tool_results_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Evidence tool results skipped as failures or empty answers"
    );

    describe_counter!(
        format!("{}_duplicate_records_total", METRICS_PREFIX),
        Unit::Count,
        "Chunk records dropped as duplicates during accumulation"
    );

    // Session metrics
    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Live session scopes"
    );

    describe_counter!(
        format!("{}_sessions_evicted_total", METRICS_PREFIX),
        Unit::Count,
        "Session scopes evicted for capacity or idleness"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record one tool call
pub fn record_tool_call(tool: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_tool_calls_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_tool_duration_seconds", METRICS_PREFIX),
        "tool" => tool.to_string()
    )
    .record(duration_secs);
}

/// Helper to record accumulation counters
pub fn record_accumulation(stats: &AccumulationStats) {
    counter!(format!("{}_tool_results_skipped_total", METRICS_PREFIX))
        .increment(stats.skipped_failures as u64);
    counter!(format!("{}_duplicate_records_total", METRICS_PREFIX))
        .increment(stats.duplicates as u64);
}

/// Helper to record a rendered digest
pub fn record_digest(items: usize, unique_chunks: usize, documents: usize) {
    counter!(format!("{}_digests_rendered_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_digest_items", METRICS_PREFIX)).record(items as f64);

    gauge!(format!("{}_digest_documents", METRICS_PREFIX)).set(documents as f64);

    tracing::debug!(items, unique_chunks, documents, "Digest rendered");
}

/// Helper to record session registry size and evictions
pub fn record_sessions(active: usize, evicted: usize) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(active as f64);
    if evicted > 0 {
        counter!(format!("{}_sessions_evicted_total", METRICS_PREFIX)).increment(evicted as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in TOOL_LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_helpers_without_recorder() {
        let metrics = RequestMetrics::start("POST", "/v2/digest");
        metrics.finish(200);
        record_tool_call("search", "ok", 0.02);
        record_digest(3, 2, 1);
        record_accumulation(&AccumulationStats::default());
        record_sessions(1, 0);
        // Just verify it runs without panic
    }
}
