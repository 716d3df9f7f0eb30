pub mod activity;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod message_handlers;
pub mod metrics;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use crate::app_state::AppState;
pub use crate::config::HostConfig;
pub use crate::metrics::HostMetrics;

use crate::auth::auth_middleware;
use crate::message_handlers::handle_activity;

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Public health and metrics routes plus the bearer-protected messaging endpoint.
pub fn build_router(state: AppState) -> Router {
    let auth_state = state.clone();
    let protected_api = Router::new()
        .route("/api/messages", post(handle_activity))
        .layer(middleware::from_fn(move |request, next| {
            let state = auth_state.clone();
            async move { auth_middleware(state, request, next).await }
        }));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .merge(protected_api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
