use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{get_checkpoint, get_health, get_status, get_validator_status, AppState};

/// Create the HTTP router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .route("/status/{index}", get(get_validator_status))
        .route("/checkpoint", get(get_checkpoint))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
