//! Route definitions for the gateway API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware, state::AppState};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit;

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/keep-alive", get(handlers::keep_alive))
        .nest("/api", api_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        // Apply middleware
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::cors_layer())
        // Add state
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route(
            "/stats",
            get(handlers::get_stats).delete(handlers::flush_stats),
        )
        .route("/providers", get(handlers::list_providers))
}
