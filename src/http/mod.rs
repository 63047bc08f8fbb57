//! HTTP surface over the caching executor.
//!
//! - `POST /query` runs a find or aggregation, optionally through the cache
//! - `DELETE /cache/:entity` flushes every cached result for one entity
//! - `GET /health` reports connection state and cache statistics

mod error;
mod handlers;
mod routes;

use std::sync::Arc;

use crate::executor::CachingExecutor;

pub use error::ApiError;
pub use handlers::{CacheRequest, QueryRequest};
pub use routes::router;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub executor: CachingExecutor,
}

impl AppState {
    pub fn new(executor: CachingExecutor) -> Arc<Self> {
        Arc::new(Self { executor })
    }
}
