//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use strmshot_queue::QueueStatus;

/// Install the Prometheus recorder and return a handle for rendering.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "strmshot_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "strmshot_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "strmshot_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "strmshot_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "strmshot_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "strmshot_ws_messages_sent_total";

    // Queue metrics
    pub const QUEUE_RUNNING: &str = "strmshot_queue_running";
    pub const QUEUE_WAITING: &str = "strmshot_queue_waiting";
    pub const QUEUE_CONCURRENCY_LIMIT: &str = "strmshot_queue_concurrency_limit";

    // Cache metrics
    pub const DURATION_CACHE_ENTRIES: &str = "strmshot_duration_cache_entries";
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

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent(endpoint: &str, message_type: &str) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("type", message_type.to_string()),
    ];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Publish a queue snapshot as gauges.
pub fn set_queue_status(status: &QueueStatus) {
    gauge!(names::QUEUE_RUNNING).set(status.running as f64);
    gauge!(names::QUEUE_WAITING).set(status.queued as f64);
    gauge!(names::QUEUE_CONCURRENCY_LIMIT).set(status.concurrency_limit as f64);
}

pub fn set_cache_entries(entries: usize) {
    gauge!(names::DURATION_CACHE_ENTRIES).set(entries as f64);
}

/// Unmatched paths collapse into one label so scanners can't blow up cardinality.
fn route_label(path: &str) -> &str {
    const KNOWN: &[&str] = &[
        "/health",
        "/healthz",
        "/ready",
        "/metrics",
        "/api/scan",
        "/api/queue/status",
        "/api/queue/clear",
        "/api/cache/stats",
        "/ws/batch",
    ];
    KNOWN.iter().copied().find(|p| *p == path).unwrap_or("other")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = route_label(request.uri().path()).to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    record_http_request(&method, &path, status, start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_label() {
        assert_eq!(route_label("/api/scan"), "/api/scan");
        assert_eq!(route_label("/ws/batch"), "/ws/batch");
        assert_eq!(route_label("/wp-admin/install.php"), "other");
    }
}
