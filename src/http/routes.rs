//! Route table.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};

use super::{AppState, handlers};

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/query", post(handlers::run_query))
        .route("/cache/:entity", delete(handlers::flush_cache))
        .route("/health", get(handlers::health))
        .with_state(state)
}
