//! API Routes
//!
//! Configures the Axum router with all journal endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, items_handler, more_handler, recount_handler, state_handler, stats_handler,
    visibility_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /items?start=&len=` - Read a window of slots
/// - `GET /state` - Follower flags and count
/// - `POST /more` - Reload from the head of the journal
/// - `PUT /visibility` - Report whether the first item is visible
/// - `POST /recount` - Refresh the record count
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/items", get(items_handler))
        .route("/state", get(state_handler))
        .route("/more", post(more_handler))
        .route("/visibility", put(visibility_handler))
        .route("/recount", post(recount_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
