//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "genova_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "genova_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "genova_http_requests_in_flight";

    // Billing metrics
    pub const GENERATIONS_TOTAL: &str = "genova_generations_total";
    pub const GENERATIONS_REJECTED_TOTAL: &str = "genova_generations_rejected_total";
    pub const CREDITS_CHARGED_TOTAL: &str = "genova_credits_charged_total";
    pub const PURCHASES_TOTAL: &str = "genova_purchases_total";

    // Finalizer metrics
    pub const FINALIZE_TOTAL: &str = "genova_finalize_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "genova_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record an accepted, charged generation.
pub fn record_generation(model: &str, resolution: &str, cost: u32) {
    let labels = [
        ("model", model.to_string()),
        ("resolution", resolution.to_string()),
    ];
    counter!(names::GENERATIONS_TOTAL, &labels).increment(1);
    counter!(names::CREDITS_CHARGED_TOTAL).increment(cost as u64);
}

/// Record a rejected generation with its rejection code.
pub fn record_generation_rejected(code: &str) {
    let labels = [("code", code.to_string())];
    counter!(names::GENERATIONS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record a completed store purchase.
pub fn record_purchase(kind: &str, sku: &str) {
    let labels = [("kind", kind.to_string()), ("sku", sku.to_string())];
    counter!(names::PURCHASES_TOTAL, &labels).increment(1);
}

/// Record a finalizer outcome.
pub fn record_finalize(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::FINALIZE_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Metrics middleware for HTTP requests.
///
/// Every route is a fixed path, so the raw path is a safe label.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
