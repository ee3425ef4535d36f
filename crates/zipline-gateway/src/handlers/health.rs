use crate::model::HealthResponse;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use jiff::Timestamp;
use std::collections::BTreeMap;

fn status_word(ok: bool) -> &'static str {
    if ok {
        "healthy"
    } else {
        "unhealthy"
    }
}

/// GET /api/v1/healthz — liveness plus per-collaborator status.
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.service.health().await;

    let mut services = BTreeMap::new();
    services.insert("api", "healthy");
    services.insert("database", status_word(health.store_ok));
    services.insert("cache", status_word(health.cache_ok));

    Json(HealthResponse {
        status: if health.store_ok && health.cache_ok {
            "healthy"
        } else {
            "degraded"
        },
        timestamp: Timestamp::now(),
        services,
    })
}

/// GET /api/v1/readyz — readiness.
pub async fn readyz(State(state): State<AppState>) -> Json<HealthResponse> {
    let health = state.service.health().await;

    let mut services = BTreeMap::new();
    services.insert("api", "ready");
    services.insert("database", status_word(health.store_ok));
    services.insert("cache", status_word(health.cache_ok));

    Json(HealthResponse {
        status: "ready",
        timestamp: Timestamp::now(),
        services,
    })
}
