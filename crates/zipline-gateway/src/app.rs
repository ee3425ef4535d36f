use crate::config::{to_std, Config, SecurityConfig};
use crate::handlers::{admin, health, links, redirect};
use crate::middleware::{admission, track_metrics};
use crate::state::AppState;
use crate::metrics;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct App {}

impl App {
    /// Builds the full router. Outermost to innermost the middleware
    /// stack is: trace, request timeout, CORS, admission, metrics.
    pub fn router(state: AppState, config: &Config) -> Router {
        let api = Router::new()
            .route("/shorten", post(links::create_url))
            .route(
                "/urls/:code",
                get(links::url_metadata).delete(links::delete_url),
            )
            .route("/admin/cleanup", post(admin::cleanup))
            .route("/healthz", get(health::healthz))
            .route("/readyz", get(health::readyz));

        Router::new()
            .nest("/api/v1", api)
            .route("/metrics", get(metrics::scrape))
            // The redirect route comes last so the fixed prefixes above
            // take priority.
            .route("/:code", get(redirect::redirect))
            .layer(axum_middleware::from_fn(track_metrics))
            .layer(axum_middleware::from_fn_with_state(state.clone(), admission))
            .layer(Self::cors_layer(&config.security))
            .layer(TimeoutLayer::new(to_std(config.server.read_timeout)))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    fn cors_layer(security: &SecurityConfig) -> CorsLayer {
        let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if security.allowed_origins.is_empty()
            || security.allowed_origins.iter().any(|origin| origin == "*")
        {
            return layer.allow_origin(Any);
        }

        let origins: Vec<HeaderValue> = security
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
