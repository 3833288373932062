//! Directory scan handler.

use std::path::PathBuf;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use strmshot_worker::{ensure_within_root, scan_directory};
use tracing::info;
use validator::Validate;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ScanRequest {
    #[validate(length(min = 1, max = 4096))]
    pub directory: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub files: Vec<String>,
}

/// List `.strm` files under a directory, recursively and sorted.
pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> ApiResult<Json<ScanResponse>> {
    request.validate()?;

    let mut directory = PathBuf::from(&request.directory);
    if let Some(root) = &state.config.media_root {
        directory = ensure_within_root(&directory, root).await?;
    }

    let files = scan_directory(directory.clone()).await?;
    info!(directory = %directory.display(), count = files.len(), "Scanned directory");

    Ok(Json(ScanResponse { files }))
}
