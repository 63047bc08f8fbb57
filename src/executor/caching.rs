//! Executor decorator adding the result cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::QueryExecutor;
use crate::cache::{
    CacheEngine, CacheOptions, ConnectionManager, FlushOutcome, WildcardInvalidator,
};
use crate::error::QueryResult;
use crate::query::{CacheDirective, QueryDescriptor};

/// Wraps an executor with the caching decision engine.
///
/// Plain [`QueryExecutor::execute`] calls go straight to the wrapped
/// executor; [`execute_cached`](Self::execute_cached) honors a directive.
/// Cloning is cheap and shares the engine.
#[derive(Clone)]
pub struct CachingExecutor {
    direct: Arc<dyn QueryExecutor>,
    engine: Arc<CacheEngine>,
    invalidator: WildcardInvalidator,
}

impl CachingExecutor {
    pub fn new(
        direct: Arc<dyn QueryExecutor>,
        connection: Arc<ConnectionManager>,
        options: CacheOptions,
    ) -> Self {
        Self {
            direct,
            engine: Arc::new(CacheEngine::new(connection.clone(), options)),
            invalidator: WildcardInvalidator::new(connection),
        }
    }

    /// Execute honoring `directive`.
    pub async fn execute_cached(
        &self,
        descriptor: &QueryDescriptor,
        directive: &mut CacheDirective,
    ) -> QueryResult<Value> {
        let direct = &self.direct;
        self.engine
            .execute_with_cache(descriptor, directive, || direct.execute(descriptor))
            .await
    }

    /// Drop every cached result for `entity`.
    pub async fn flush(&self, entity: &str) -> FlushOutcome {
        self.invalidator.flush_entity(entity).await
    }

    /// Wait for background cache writes to finish.
    pub async fn settle(&self) {
        self.engine.settle().await;
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }
}

#[async_trait]
impl QueryExecutor for CachingExecutor {
    async fn execute(&self, descriptor: &QueryDescriptor) -> QueryResult<Value> {
        self.direct.execute(descriptor).await
    }
}

impl std::fmt::Debug for CachingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingExecutor")
            .field("engine", &self.engine)
            .finish()
    }
}
