//! Prometheus metrics exposed at `/metrics`.

use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Total HTTP requests by method, matched route and status code.
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("zipline_http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds by method and matched route.
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        histogram_opts!(
            "zipline_http_request_duration_seconds",
            "HTTP request duration in seconds",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
        ),
        &["method", "path"]
    )
    .unwrap();

    /// Admission denials by scope (global or client).
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("zipline_rate_limited_total", "Requests denied by admission control"),
        &["scope"]
    )
    .unwrap();

    /// Redirect lookups by outcome.
    pub static ref REDIRECTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("zipline_redirects_total", "Redirect lookups by outcome"),
        &["outcome"]
    )
    .unwrap();
}

/// Handler for the Prometheus scrape endpoint.
pub async fn scrape() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
