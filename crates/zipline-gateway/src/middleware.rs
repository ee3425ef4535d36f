//! Tower middleware: admission control and request metrics.

use crate::error::ApiError;
use crate::extract::client_identity;
use crate::limit::Decision;
use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS, RATE_LIMITED_TOTAL};
use crate::state::AppState;
use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::debug;

/// Denies the request before any routing work when either bucket is
/// out of tokens.
pub async fn admission(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_identity(request.headers(), peer);

    match state.limiter.allow(&client) {
        Decision::Allowed => next.run(request).await,
        denied => {
            let scope = match denied {
                Decision::DeniedGlobal => "global",
                _ => "client",
            };
            RATE_LIMITED_TOTAL.with_label_values(&[scope]).inc();
            debug!(client = %client, scope, "request denied by admission control");
            ApiError::rate_limited().into_response()
        }
    }
}

/// Records request counts and latencies labeled by the matched route,
/// keeping metric cardinality bounded.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, response.status().as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}
