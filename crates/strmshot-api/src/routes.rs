//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{cache_stats, clear_queue, health, queue_status, ready, scan};
use crate::metrics::{self as api_metrics, metrics_middleware};
use crate::middleware::{cors_layer, request_id, request_logging, require_token, security_headers};
use crate::state::AppState;
use crate::ws::ws_batch;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/scan", post(scan))
        .route("/queue/status", get(queue_status))
        .route("/queue/clear", post(clear_queue))
        .route("/cache/stats", get(cache_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    // Authenticated in the first message instead of a header
    let ws_routes = Router::new().route("/ws/batch", get(ws_batch));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        let gauges = state.clone();
        Router::new().route(
            "/metrics",
            get(move || async move {
                api_metrics::set_queue_status(&gauges.queue.status());
                api_metrics::set_cache_entries(gauges.cache.len());
                handle.render()
            }),
        )
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
