use crate::error::{ApiError, Result};
use crate::model::CleanupResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use jiff::Timestamp;
use tracing::info;

/// POST /api/v1/admin/cleanup — runs one reaper batch on demand.
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let count = state
        .service
        .cleanup_expired()
        .await
        .map_err(|e| ApiError::cleanup_failed(format!("Failed to cleanup expired URLs: {e}")))?;

    info!(count, "manual cleanup completed");
    Ok(Json(CleanupResponse {
        message: "Cleanup completed successfully".to_string(),
        timestamp: Timestamp::now(),
    }))
}
