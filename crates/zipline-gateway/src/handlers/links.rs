use crate::error::Result;
use crate::model::{CreateUrlRequest, CreateUrlResponse, DeleteUrlResponse, UrlMetadataResponse};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;
use zipline_service::CreateRequest;

/// POST /api/v1/shorten
pub async fn create_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateUrlRequest>,
) -> Result<(StatusCode, Json<CreateUrlResponse>)> {
    // The body field wins; the header is the adapter-level fallback
    // until real authentication lands.
    let created_by = body.created_by.or_else(|| {
        headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    });

    let created = state
        .service
        .create(CreateRequest {
            long_url: body.url,
            custom_alias: body.custom_alias,
            expire_at: body.expire_at,
            created_by,
            metadata: body.metadata,
        })
        .await?;

    info!(code = %created.code, "short url created");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /api/v1/urls/:code
pub async fn url_metadata(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<UrlMetadataResponse>> {
    let metadata = state.service.metadata(&code).await?;
    Ok(Json(metadata.into()))
}

/// DELETE /api/v1/urls/:code
pub async fn delete_url(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<DeleteUrlResponse>> {
    let code = state.service.delete(&code).await?;

    info!(code = %code, "short url deleted");
    Ok(Json(DeleteUrlResponse {
        message: "URL deleted successfully".to_string(),
        code: code.to_string(),
    }))
}
