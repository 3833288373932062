//! Queue introspection handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use strmshot_queue::QueueStatus;
use tracing::info;

use crate::metrics;
use crate::state::AppState;

/// Current queue snapshot.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    let status = state.queue.status();
    metrics::set_queue_status(&status);
    Json(status)
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub discarded: usize,
}

/// Drop jobs that have not started. Running jobs finish normally.
pub async fn clear_queue(State(state): State<AppState>) -> Json<ClearResponse> {
    let discarded = state.queue.clear();
    info!(discarded, "Queue cleared");
    Json(ClearResponse { discarded })
}
