use inference::Detector;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;

const METER_NAME: &str = "gateway";

#[derive(Clone)]
pub struct RequestMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
}

impl RequestMetrics {
    pub fn new() -> Self {
        let meter = global::meter(METER_NAME);
        let latency_buckets = [
            0.005, 0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
        ];
        let duration = meter
            .f64_histogram("detection_request_duration_seconds")
            .with_description("Time to serve one request (decode + infer + normalize)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build();
        let requests = meter
            .u64_counter("detection_requests_total")
            .with_description("Total requests served, by status code")
            .build();

        Self { duration, requests }
    }

    pub fn record(&self, status_code: u16, elapsed_secs: f64) {
        let attributes = [KeyValue::new("status", i64::from(status_code))];
        self.duration.record(elapsed_secs, &attributes);
        self.requests.add(1, &attributes);
    }
}

impl Default for RequestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detector>,
    pub metrics: RequestMetrics,
}

impl AppState {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self {
            detector,
            metrics: RequestMetrics::new(),
        }
    }
}
