use crate::error::ApiError;
use crate::extract::click_hints;
use crate::metrics::REDIRECTS_TOTAL;
use crate::state::AppState;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::debug;
use zipline_core::ServiceError;

/// GET /:code — the redirect hot path.
///
/// A resolved code answers 301 with the destination in `Location`; the
/// click record never blocks the response.
pub async fn redirect(
    State(state): State<AppState>,
    Path(code): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let hints = click_hints(&headers, peer);

    match state.service.resolve(&code, hints).await {
        Ok(resolved) => {
            debug!(code = %resolved.code, "redirecting");
            REDIRECTS_TOTAL.with_label_values(&["redirected"]).inc();
            (
                StatusCode::MOVED_PERMANENTLY,
                [(header::LOCATION, resolved.long_url)],
            )
                .into_response()
        }
        Err(err) => {
            let outcome = match &err {
                ServiceError::NotFound | ServiceError::InvalidCode(_) => "not_found",
                ServiceError::Deleted | ServiceError::Expired => "gone",
                _ => "error",
            };
            REDIRECTS_TOTAL.with_label_values(&[outcome]).inc();
            ApiError::from(err).into_response()
        }
    }
}
