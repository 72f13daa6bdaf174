//! Route Configuration
//!
//! Configures all HTTP routes for the service.

use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, create_cors_layer};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // WebSocket gateway endpoint; authentication happens in-band via
        // the Identify handshake
        .route("/gateway", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes (all protected)
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/voice", voice_routes())
        // Internal fan-out entry point for the platform API
        .route("/notify", post(handlers::notify::notify))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Telephony provisioning routes
fn voice_routes() -> Router<AppState> {
    Router::new()
        .route("/account", post(handlers::voice::provision_account))
        .route("/credentials", get(handlers::voice::get_credentials))
}
