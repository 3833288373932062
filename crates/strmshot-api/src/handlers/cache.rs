//! Duration cache handlers.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub entries: usize,
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let entries = state.cache.len();
    metrics::set_cache_entries(entries);
    Json(CacheStatsResponse { entries })
}
